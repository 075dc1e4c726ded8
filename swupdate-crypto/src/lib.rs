//! Crypto providers for the streaming update pipeline: hashing, AES-CBC /
//! asymmetric-envelope decryption, zlib-gzip / zstd decompression and
//! RSA-PKCS1/PKCS8 signature verification, assembled behind a small
//! provider registry so the transform chain never has to know about a
//! concrete cipher crate.

mod error;

pub mod decompress;
pub mod decrypt;
pub mod hash;
pub mod registry;
pub mod sign;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
