//! Per-artifact transform chain: archive payload -> decrypt -> decompress
//! -> hash-tee -> sink (§4.3). Buffers are fixed-size working regions; the
//! chain never holds a whole artifact in memory.

use std::io::Read;

use swupdate_crypto::decompress::Decompressor;
use swupdate_crypto::decrypt::Decryptor;
use swupdate_crypto::hash::RunningHash;
use swupdate_crypto::registry::{build_decompressor, CryptoConfig};

use crate::error::{Error, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// Compression selector as it appears on a manifest artifact; maps onto
/// `swupdate_crypto::registry::Compression` when building the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionSelector {
    #[default]
    None,
    ZlibGzip,
    Zstd,
}

impl From<CompressionSelector> for swupdate_crypto::registry::Compression {
    fn from(value: CompressionSelector) -> Self {
        match value {
            CompressionSelector::None => swupdate_crypto::registry::Compression::None,
            CompressionSelector::ZlibGzip => swupdate_crypto::registry::Compression::ZlibGzip,
            CompressionSelector::Zstd => swupdate_crypto::registry::Compression::Zstd,
        }
    }
}

/// A sink that receives decoded artifact bytes in order; handlers plug
/// their writer in here (§4.4).
pub trait Sink {
    fn write_chunk(&mut self, chunk: &[u8]) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn finish(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// Lets a plain closure act as a `Sink`, for handlers and tests that
/// don't need a `finish` step.
impl<F> Sink for F
where
    F: FnMut(&[u8]) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>,
{
    fn write_chunk(&mut self, chunk: &[u8]) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self(chunk)
    }
}

pub struct ChainSpec {
    pub encrypted: bool,
    pub per_artifact_iv: Option<[u8; 16]>,
    pub compression: CompressionSelector,
    pub expected_sha256: Option<[u8; 32]>,
}

/// Runs one artifact's payload through decrypt, decompress and hash-tee,
/// feeding the resulting plaintext to `sink` in chunks, then checking
/// the hash once the source is exhausted.
pub fn run_chain<R: Read>(mut source: R, spec: &ChainSpec, crypto: &CryptoConfig, sink: &mut dyn Sink, cancel: &dyn Fn() -> bool) -> Result<()> {
    let mut decryptor: Option<Box<dyn Decryptor + Send>> = if spec.encrypted {
        Some(crypto.build_decryptor(spec.per_artifact_iv).map_err(Error::Decrypt)?)
    } else {
        None
    };
    let mut decompressor: Box<dyn Decompressor + Send> = build_decompressor(spec.compression.into()).map_err(Error::Decompress)?;
    let mut hasher = RunningHash::new();

    let mut read_buf = vec![0u8; CHUNK_SIZE];
    let mut decrypted = Vec::with_capacity(CHUNK_SIZE);
    let mut decompressed = Vec::with_capacity(CHUNK_SIZE);

    loop {
        if cancel() {
            return Err(Error::Cancelled);
        }
        let n = source.read(&mut read_buf)?;
        if n == 0 {
            break;
        }
        let ciphertext_or_plain = &read_buf[..n];

        decrypted.clear();
        match decryptor.as_mut() {
            Some(d) => d.update(ciphertext_or_plain, &mut decrypted).map_err(Error::Decrypt)?,
            None => decrypted.extend_from_slice(ciphertext_or_plain),
        }

        decompressed.clear();
        decompressor.update(&decrypted, &mut decompressed).map_err(Error::Decompress)?;

        hasher.update(&decompressed);
        sink.write_chunk(&decompressed).map_err(|err| Error::Handler("sink".to_string(), err))?;
    }

    if let Some(mut d) = decryptor.take() {
        loop {
            decrypted.clear();
            let done = d.finish(&mut decrypted).map_err(Error::Decrypt)?;

            decompressed.clear();
            decompressor.update(&decrypted, &mut decompressed).map_err(Error::Decompress)?;
            hasher.update(&decompressed);
            sink.write_chunk(&decompressed).map_err(|err| Error::Handler("sink".to_string(), err))?;

            if done {
                break;
            }
        }
    }

    decompressed.clear();
    decompressor.finish(&mut decompressed).map_err(Error::Decompress)?;
    hasher.update(&decompressed);
    sink.write_chunk(&decompressed).map_err(|err| Error::Handler("sink".to_string(), err))?;

    if let Some(expected) = spec.expected_sha256 {
        hasher.finalize_and_verify(&expected).map_err(Error::HashMismatch)?;
    }

    sink.finish().map_err(|err| Error::Handler("sink".to_string(), err))?;
    Ok(())
}
