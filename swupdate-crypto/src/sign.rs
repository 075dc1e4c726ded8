//! RSA signature verification over the manifest digest.
//!
//! Ported from the PKCS1/PKCS8 helpers used to verify delta-update payload
//! signatures; the same construction (RSA + SHA-256, PKCS#1 v1.5 padding)
//! is used here to verify the `sw-description` manifest against its
//! detached signature entry.

use std::{fs, str};

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::sha2::Sha256;
use rsa::signature::hazmat::PrehashVerifier;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::Error;
use crate::Result;

#[derive(Debug, Clone, Copy)]
pub enum KeyType {
    Pkcs1,
    Pkcs8,
}

pub fn sign_rsa_pkcs(databuf: &[u8], private_key: RsaPrivateKey) -> Result<Vec<u8>> {
    let signing_key = pkcs1v15::SigningKey::<Sha256>::new(private_key);

    let signature = signing_key.sign(databuf);
    if signature.to_bytes().as_ref() == databuf {
        Err(Error::DatabufNotSignedCorrectly)
    } else {
        Ok(signature.to_vec())
    }
}

/// Verifies `signature` over the full manifest bytes (not a digest).
pub fn verify_rsa_pkcs_buf(databuf: &[u8], signature: &[u8], public_key: RsaPublicKey) -> Result<()> {
    let verifying_key = pkcs1v15::VerifyingKey::<Sha256>::new(public_key);

    verifying_key
        .verify(databuf, &pkcs1v15::Signature::try_from(signature).map_err(Error::InvalidPkcs1v15Signature)?)
        .map_err(Error::CouldNotVerifySignature)
}

/// Verifies `signature` over a pre-computed SHA-256 digest; unlike
/// [`verify_rsa_pkcs_buf`] this has no limit on the size of the data that
/// was hashed.
pub fn verify_rsa_pkcs_prehash(digestbuf: &[u8], signature: &[u8], public_key: RsaPublicKey) -> Result<()> {
    let verifying_key = pkcs1v15::VerifyingKey::<Sha256>::new(public_key);

    verifying_key
        .verify_prehash(digestbuf, &pkcs1v15::Signature::try_from(signature).map_err(Error::InvalidPkcs1v15Signature)?)
        .map_err(Error::CouldNotVerifySignature)
}

pub fn get_private_key_pkcs_pem(private_key_path: &str, key_type: KeyType) -> Result<RsaPrivateKey> {
    let private_key_buf = fs::read_to_string(private_key_path).map_err(Error::ReadPrivateKey)?;
    match key_type {
        KeyType::Pkcs1 => RsaPrivateKey::from_pkcs1_pem(private_key_buf.as_str()).map_err(Error::DeserialisePkcs1),
        KeyType::Pkcs8 => RsaPrivateKey::from_pkcs8_pem(private_key_buf.as_str()).map_err(Error::DeserialisePkcs8),
    }
}

pub fn get_public_key_pkcs_pem(public_key_path: &str, key_type: KeyType) -> Result<RsaPublicKey> {
    let public_key_buf = fs::read_to_string(public_key_path).map_err(Error::ReadPublicKey)?;
    match key_type {
        KeyType::Pkcs1 => RsaPublicKey::from_pkcs1_pem(public_key_buf.as_str()).map_err(Error::DeserialisePkcs1),
        KeyType::Pkcs8 => RsaPublicKey::from_public_key_pem(public_key_buf.as_str()).map_err(Error::DecodePublicKey),
    }
}
