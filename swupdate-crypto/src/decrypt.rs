//! Decrypt stage of the transform chain.
//!
//! `AesCbcDecryptor` is the common case: AES-128/192/256 CBC with PKCS#7
//! padding, selected by key length, operating on the stream a chunk at a
//! time. `AsymmetricEnvelopeDecryptor` is the alternative provider the
//! specification describes as buffering its whole input before emitting
//! any plaintext and reporting "EAGAIN" from `update` -- here that shows
//! up as `update` never writing to `out`, and `finish` needing to be
//! called repeatedly (it drains one chunk per call) until it returns
//! `true`.

use aes::cipher::{BlockDecryptMut, KeyIvInit};
use cbc::cipher::block_padding::Pkcs7;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};

use crate::Error;
use crate::Result;

const BLOCK_LEN: usize = 16;
const DRAIN_CHUNK: usize = 64 * 1024;

/// A decrypt stage that consumes ciphertext incrementally.
pub trait Decryptor {
    /// Feeds `input` ciphertext bytes, appending any plaintext that can
    /// already be emitted to `out`.
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()>;

    /// Finalizes the stream. Some providers need several calls to fully
    /// drain; returns `true` once nothing more will ever be appended to
    /// `out`.
    fn finish(&mut self, out: &mut Vec<u8>) -> Result<bool>;
}

enum AesVariant {
    Aes128(cbc::Decryptor<aes::Aes128>),
    Aes192(cbc::Decryptor<aes::Aes192>),
    Aes256(cbc::Decryptor<aes::Aes256>),
}

/// AES-CBC decryptor with PKCS#7 padding, the key length selecting
/// AES-128/192/256. Operates one full block at a time; the final block is
/// always held back until `finish`, since only then is it known to be the
/// last block and padding can be safely stripped.
pub struct AesCbcDecryptor {
    cipher: Option<AesVariant>,
    pending: Vec<u8>,
}

impl AesCbcDecryptor {
    pub fn new(key: &[u8], iv: &[u8; 16]) -> Result<Self> {
        let cipher = match key.len() {
            16 => AesVariant::Aes128(cbc::Decryptor::<aes::Aes128>::new(key.into(), iv.into())),
            24 => AesVariant::Aes192(cbc::Decryptor::<aes::Aes192>::new(key.into(), iv.into())),
            32 => AesVariant::Aes256(cbc::Decryptor::<aes::Aes256>::new(key.into(), iv.into())),
            other => return Err(Error::UnsupportedKeyLength(other)),
        };
        Ok(AesCbcDecryptor {
            cipher: Some(cipher),
            pending: Vec::new(),
        })
    }

    fn decrypt_blocks_except_last(&mut self, out: &mut Vec<u8>) -> Result<()> {
        // Keep at least one full block in `pending` at all times so that
        // `finish` always has the true final block to unpad.
        let usable = self.pending.len().saturating_sub(BLOCK_LEN);
        let usable_blocks = usable - (usable % BLOCK_LEN);
        if usable_blocks == 0 {
            return Ok(());
        }

        let mut blocks: Vec<u8> = self.pending.drain(..usable_blocks).collect();
        if blocks.len() % BLOCK_LEN != 0 {
            return Err(Error::TruncatedCiphertext);
        }

        match self.cipher.as_mut().expect("cipher consumed") {
            AesVariant::Aes128(c) => decrypt_blocks_inplace(c, &mut blocks),
            AesVariant::Aes192(c) => decrypt_blocks_inplace(c, &mut blocks),
            AesVariant::Aes256(c) => decrypt_blocks_inplace(c, &mut blocks),
        }
        out.extend_from_slice(&blocks);
        Ok(())
    }
}

fn decrypt_blocks_inplace<C: BlockDecryptMut>(cipher: &mut C, data: &mut [u8]) {
    use aes::cipher::generic_array::GenericArray;
    for chunk in data.chunks_mut(BLOCK_LEN) {
        let block = GenericArray::from_mut_slice(chunk);
        cipher.decrypt_block_mut(block);
    }
}

impl Decryptor for AesCbcDecryptor {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.pending.extend_from_slice(input);
        self.decrypt_blocks_except_last(out)
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<bool> {
        if self.pending.is_empty() {
            return Ok(true);
        }
        if self.pending.len() % BLOCK_LEN != 0 {
            return Err(Error::TruncatedCiphertext);
        }

        let mut blocks = std::mem::take(&mut self.pending);
        let cipher = self.cipher.take().expect("cipher consumed");
        let plaintext_len = match cipher {
            AesVariant::Aes128(c) => c.decrypt_padded_mut::<Pkcs7>(&mut blocks).map_err(Error::BlockCipher)?.len(),
            AesVariant::Aes192(c) => c.decrypt_padded_mut::<Pkcs7>(&mut blocks).map_err(Error::BlockCipher)?.len(),
            AesVariant::Aes256(c) => c.decrypt_padded_mut::<Pkcs7>(&mut blocks).map_err(Error::BlockCipher)?.len(),
        };

        blocks.truncate(plaintext_len);
        out.extend_from_slice(&blocks);
        Ok(true)
    }
}

/// A stand-in for a CMS (asymmetric-envelope) decrypt provider: the
/// leading `RSA_CIPHERTEXT_LEN` bytes of the stream are an RSA-encrypted
/// AES-256 key, the rest is the AES-256-CBC ciphertext (IV is the first 16
/// bytes following the RSA block). Nothing can be decrypted until the
/// whole stream has arrived, matching the spec's description of a
/// provider that reports EAGAIN from `update` and drains only in
/// `finish`.
pub struct AsymmetricEnvelopeDecryptor {
    private_key: RsaPrivateKey,
    buffered: Vec<u8>,
    drained: Option<Vec<u8>>,
    drain_pos: usize,
}

impl AsymmetricEnvelopeDecryptor {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        AsymmetricEnvelopeDecryptor {
            private_key,
            buffered: Vec::new(),
            drained: None,
            drain_pos: 0,
        }
    }

    fn rsa_block_len(&self) -> usize {
        use rsa::traits::PublicKeyParts;
        self.private_key.size()
    }
}

impl Decryptor for AsymmetricEnvelopeDecryptor {
    fn update(&mut self, input: &[u8], _out: &mut Vec<u8>) -> Result<()> {
        // EAGAIN: buffer only, nothing is emitted yet.
        self.buffered.extend_from_slice(input);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<bool> {
        if self.drained.is_none() {
            let rsa_len = self.rsa_block_len();
            if self.buffered.len() < rsa_len + 16 {
                return Err(Error::TruncatedCiphertext);
            }
            let (rsa_ct, rest) = self.buffered.split_at(rsa_len);
            let (iv_bytes, aes_ct) = rest.split_at(16);

            let aes_key = self.private_key.decrypt(Pkcs1v15Encrypt, rsa_ct).map_err(Error::RsaDecrypt)?;
            let mut iv = [0u8; 16];
            iv.copy_from_slice(iv_bytes);

            let mut aes = AesCbcDecryptor::new(&aes_key, &iv)?;
            let mut plaintext = Vec::new();
            aes.update(aes_ct, &mut plaintext)?;
            aes.finish(&mut plaintext)?;

            self.drained = Some(plaintext);
            self.drain_pos = 0;
        }

        let buf = self.drained.as_ref().unwrap();
        let end = (self.drain_pos + DRAIN_CHUNK).min(buf.len());
        out.extend_from_slice(&buf[self.drain_pos..end]);
        self.drain_pos = end;

        Ok(self.drain_pos >= buf.len())
    }
}
