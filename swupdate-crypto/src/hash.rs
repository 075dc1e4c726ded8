//! The hash-tee stage: feeds plaintext bytes into a running SHA-256 and
//! compares the final digest against the artifact's declared hash.

use sha2::{Digest, Sha256};

use crate::Error;
use crate::Result;

pub const DIGEST_LEN: usize = 32;

/// A running SHA-256 over bytes as they pass through the transform chain.
pub struct RunningHash {
    hasher: Sha256,
}

impl Default for RunningHash {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningHash {
    pub fn new() -> Self {
        RunningHash { hasher: Sha256::new() }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finalize(self) -> [u8; DIGEST_LEN] {
        self.hasher.finalize().into()
    }

    /// Finalizes and compares against `expected`, byte-for-byte.
    pub fn finalize_and_verify(self, expected: &[u8; DIGEST_LEN]) -> Result<()> {
        let got = self.finalize();
        if &got == expected {
            Ok(())
        } else {
            Err(Error::HashMismatch {
                expected: *expected,
                got,
            })
        }
    }
}

/// Decodes a 64-character hex string into a 32-byte SHA-256 digest.
pub fn decode_sha256_hex(s: &str) -> Result<[u8; DIGEST_LEN]> {
    decode_hex_fixed(s).ok_or_else(|| Error::BadHexDigest(s.to_string()))
}

pub fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").unwrap();
    }
    s
}

fn decode_hex_fixed<const N: usize>(s: &str) -> Option<[u8; N]> {
    if s.len() != N * 2 {
        return None;
    }
    let mut out = [0u8; N];
    for i in 0..N {
        out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

/// Decodes a 32-character hex string into a 16-byte AES IV.
pub fn decode_iv_hex(s: &str) -> Result<[u8; 16]> {
    decode_hex_fixed(s).ok_or_else(|| Error::BadHexDigest(s.to_string()))
}
