#[derive(Debug)]
pub enum Error {
    DatabufNotSignedCorrectly,
    InvalidPkcs1v15Signature(rsa::signature::Error),
    CouldNotVerifySignature(rsa::signature::Error),
    ReadPrivateKey(std::io::Error),
    DeserialisePkcs1(rsa::pkcs1::Error),
    DeserialisePkcs8(rsa::pkcs8::Error),
    InvalidPrivateKeyType,
    ReadPublicKey(std::io::Error),
    DecodePublicKey(rsa::pkcs8::spki::Error),
    NoValidSignature,
    EmptySignature,

    UnsupportedKeyLength(usize),
    BadIvLength(usize),
    MissingKey,
    MissingIv,
    BlockCipher(cbc::cipher::block_padding::UnpadError),
    TruncatedCiphertext,
    RsaDecrypt(rsa::Error),

    Decompress(std::io::Error),

    HashMismatch { expected: [u8; 32], got: [u8; 32] },
    BadHexDigest(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DatabufNotSignedCorrectly => write!(f, "databuf was not signed correctly"),
            Error::InvalidPkcs1v15Signature(err) => write!(f, "invalid pkcs1v15 signature: {err}"),
            Error::CouldNotVerifySignature(err) => write!(f, "failed to verify signature: {err}"),
            Error::ReadPrivateKey(err) => write!(f, "failed to read private key: {err}"),
            Error::DeserialisePkcs1(err) => write!(f, "failed to deserialise PKCS1 PEM: {err}"),
            Error::DeserialisePkcs8(err) => write!(f, "failed to deserialise PKCS8 PEM: {err}"),
            Error::InvalidPrivateKeyType => write!(f, "invalid private key type"),
            Error::ReadPublicKey(err) => write!(f, "failed to read public key: {err}"),
            Error::DecodePublicKey(err) => write!(f, "failed to decode public key: {err}"),
            Error::NoValidSignature => write!(f, "failed to find a valid signature"),
            Error::EmptySignature => write!(f, "empty signature"),
            Error::UnsupportedKeyLength(len) => write!(f, "unsupported AES key length: {len} bytes"),
            Error::BadIvLength(len) => write!(f, "IV must be 16 bytes, got {len}"),
            Error::MissingKey => write!(f, "no AES key loaded for this session"),
            Error::MissingIv => write!(f, "artifact is encrypted but no IV is available (neither per-artifact nor global)"),
            Error::BlockCipher(err) => write!(f, "block cipher padding error: {err}"),
            Error::TruncatedCiphertext => write!(f, "ciphertext is not a multiple of the block size"),
            Error::RsaDecrypt(err) => write!(f, "RSA decrypt failed: {err}"),
            Error::Decompress(err) => write!(f, "decompression failed: {err}"),
            Error::HashMismatch { expected, got } => {
                write!(f, "hash mismatch: expected {}, got {}", crate::hash::encode_hex(expected), crate::hash::encode_hex(got))
            }
            Error::BadHexDigest(s) => write!(f, "malformed hex digest: {s:?}"),
        }
    }
}
