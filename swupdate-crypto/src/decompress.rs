//! Decompress stage of the transform chain: `none | zlib-wrapped-gzip |
//! zstd`, chosen per-artifact. State is per-artifact and never reused.

use std::io::Write;

use crate::Result;

pub trait Decompressor {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()>;
    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()>;
}

/// No-op decompressor for uncompressed artifacts.
#[derive(Default)]
pub struct Identity;

impl Decompressor for Identity {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(input);
        Ok(())
    }

    fn finish(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

pub struct GzipDecompressor {
    inner: flate2::write::GzDecoder<Vec<u8>>,
}

impl Default for GzipDecompressor {
    fn default() -> Self {
        GzipDecompressor {
            inner: flate2::write::GzDecoder::new(Vec::new()),
        }
    }
}

impl Decompressor for GzipDecompressor {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.inner.write_all(input).map_err(crate::Error::Decompress)?;
        drain_into(self.inner.get_mut(), out);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.inner.try_finish().map_err(crate::Error::Decompress)?;
        drain_into(self.inner.get_mut(), out);
        Ok(())
    }
}

pub struct ZstdDecompressor<'a> {
    inner: zstd::stream::write::Decoder<'a, Vec<u8>>,
}

impl<'a> ZstdDecompressor<'a> {
    pub fn new() -> Result<Self> {
        Ok(ZstdDecompressor {
            inner: zstd::stream::write::Decoder::new(Vec::new()).map_err(crate::Error::Decompress)?,
        })
    }
}

impl<'a> Decompressor for ZstdDecompressor<'a> {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.inner.write_all(input).map_err(crate::Error::Decompress)?;
        drain_into(self.inner.get_mut(), out);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.inner.flush().map_err(crate::Error::Decompress)?;
        drain_into(self.inner.get_mut(), out);
        Ok(())
    }
}

fn drain_into(buf: &mut Vec<u8>, out: &mut Vec<u8>) {
    out.extend_from_slice(buf);
    buf.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn identity_passes_bytes_through() {
        let mut d = Identity;
        let mut out = Vec::new();
        d.update(b"hello", &mut out).unwrap();
        d.finish(&mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn gzip_roundtrip() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"some plaintext artifact bytes").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut d = GzipDecompressor::default();
        let mut out = Vec::new();
        for chunk in compressed.chunks(5) {
            d.update(chunk, &mut out).unwrap();
        }
        d.finish(&mut out).unwrap();
        assert_eq!(out, b"some plaintext artifact bytes");
    }

    #[test]
    fn zstd_roundtrip() {
        let compressed = zstd::stream::encode_all(&b"zstd compressed artifact data"[..], 0).unwrap();

        let mut d = ZstdDecompressor::new().unwrap();
        let mut out = Vec::new();
        for chunk in compressed.chunks(7) {
            d.update(chunk, &mut out).unwrap();
        }
        d.finish(&mut out).unwrap();
        assert_eq!(out, b"zstd compressed artifact data");
    }
}
