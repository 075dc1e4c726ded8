//! Process-wide agent configuration: the handful of things the original
//! project reads from `/etc/swupdate.cfg`, CLI flags and compiled-in
//! defaults. Built once by whichever front-end embeds the coordinator and
//! threaded through explicitly -- nothing else in this crate reads the
//! environment or a config file on its own.

use std::path::PathBuf;
use std::sync::Arc;

use swupdate_crypto::registry::CryptoConfig;
use swupdate_crypto::sign::{get_public_key_pkcs_pem, KeyType};

use crate::error::{Error, Result};
use crate::hwcompat::DeviceIdentity;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Overrides the on-device hardware identity file when set. Mirrors
    /// `get_hw_revision`'s "don't overwrite if already set from the
    /// command line" rule: this field wins over the on-device file.
    pub device_identity_override: Option<DeviceIdentity>,
    pub device_identity_file: PathBuf,

    pub hash_verification_enabled: bool,
    pub signed_image_mode: bool,
    pub aes_key_file: Option<PathBuf>,
    pub public_key_file: Option<PathBuf>,

    /// Persistent-state key name; defaults to `recovery_status` per spec.
    pub recovery_status_key: String,

    pub control_socket_path: PathBuf,
    pub progress_socket_path: PathBuf,

    pub max_manifest_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            device_identity_override: None,
            device_identity_file: PathBuf::from("/etc/hwrevision"),
            hash_verification_enabled: true,
            signed_image_mode: false,
            aes_key_file: None,
            public_key_file: None,
            recovery_status_key: "recovery_status".to_string(),
            control_socket_path: PathBuf::from("/tmp/sockets/swupdateprog"),
            progress_socket_path: PathBuf::from("/tmp/sockets/swupdateprog.progress"),
            max_manifest_size: 16 * 1024 * 1024,
        }
    }
}

impl AgentConfig {
    /// Resolves the device identity: the configured override wins,
    /// otherwise the file is read as `board revision` on one line.
    pub fn resolve_device_identity(&self) -> crate::error::Result<DeviceIdentity> {
        if let Some(identity) = &self.device_identity_override {
            return Ok(identity.clone());
        }
        let contents = std::fs::read_to_string(&self.device_identity_file)
            .map_err(|err| crate::error::Error::OpenFile(self.device_identity_file.clone(), err))?;
        let mut parts = contents.split_whitespace();
        let board = parts.next().unwrap_or_default().to_string();
        let revision = parts.next().unwrap_or_default().to_string();
        Ok(DeviceIdentity { board, revision })
    }

    /// Builds the [`CryptoConfig`] the transform chain and signature
    /// verifier need, loading the AES key file (`hexkey [hexiv]` on one
    /// line, the convention the original project's `-k` key file uses)
    /// and the public key file (tried as PKCS8 PEM, falling back to
    /// PKCS1) when configured.
    pub fn build_crypto_config(&self) -> Result<CryptoConfig> {
        let mut crypto = CryptoConfig::default();

        if let Some(path) = &self.aes_key_file {
            let contents = std::fs::read_to_string(path).map_err(|err| Error::OpenFile(path.clone(), err))?;
            let mut tokens = contents.split_whitespace();
            let key_hex = tokens.next().ok_or_else(|| Error::Config(format!("key file {path:?} is empty")))?;
            let key = decode_hex(key_hex).map_err(|_| Error::Config(format!("key file {path:?} has a non-hex key")))?;
            crypto.aes_key = Some(Arc::new(key));

            if let Some(iv_hex) = tokens.next() {
                let iv = swupdate_crypto::hash::decode_iv_hex(iv_hex).map_err(|err| Error::Config(format!("key file {path:?} has a bad IV: {err}")))?;
                crypto.global_iv = Some(iv);
            }
        }

        if let Some(path) = &self.public_key_file {
            let path_str = path.to_str().ok_or_else(|| Error::Config(format!("public key path {path:?} is not valid UTF-8")))?;
            let key = get_public_key_pkcs_pem(path_str, KeyType::Pkcs8).or_else(|_| get_public_key_pkcs_pem(path_str, KeyType::Pkcs1));
            let key = key.map_err(|err| Error::Config(format!("failed to load public key {path:?}: {err}")))?;
            crypto.public_key = Some(Arc::new(key));
        }

        Ok(crypto)
    }
}

fn decode_hex(s: &str) -> std::result::Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ())).collect()
}
