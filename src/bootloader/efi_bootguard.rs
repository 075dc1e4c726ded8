//! EFI Boot Guard backend: the one backend with native transaction
//! semantics (`bootloader/ebg.c`'s `bg_*` environment-revision API).
//! `recovery_status` writes are reinterpreted here as lifecycle calls
//! against a numbered environment revision instead of a plain key/value
//! write (§4.6, DESIGN NOTES §9):
//!
//! - `in-progress` -> create a new environment revision to install into
//! - `testing`     -> finalize that revision so the next boot tries it
//! - `done`        -> acknowledge it, making it the new primary
//! - `failed`      -> leave the previous revision primary untouched
//!
//! `ustate` mirrors EFI Boot Guard's own field name for "has this
//! revision been confirmed to boot".

use std::path::PathBuf;

use super::env_file::EnvFile;
use super::{Bootloader, TransactionState};
use crate::error::Result;

const DEFAULT_CONFIG_PATH: &str = "/etc/swupdate/ebg.config";

pub struct EfiBootGuardAdapter {
    env: EnvFile,
    config_path: PathBuf,
}

impl Default for EfiBootGuardAdapter {
    fn default() -> Self {
        EfiBootGuardAdapter {
            env: EnvFile::new(PathBuf::from("/etc/swupdate/ebg-env")),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }
}

impl EfiBootGuardAdapter {
    pub fn with_paths(env_path: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        EfiBootGuardAdapter {
            env: EnvFile::new(env_path),
            config_path: config_path.into(),
        }
    }

    fn current_revision(&self) -> Result<u32> {
        Ok(self.env.get("revision")?.and_then(|s| s.parse().ok()).unwrap_or(0))
    }

    fn create_new_environment_revision(&self) -> Result<()> {
        let next = self.current_revision()? + 1;
        self.env.apply_list(&[("revision".to_string(), next.to_string()), ("ustate".to_string(), "installing".to_string())])
    }

    fn finalize(&self) -> Result<()> {
        self.env.set("ustate", "testing")
    }

    fn acknowledge(&self) -> Result<()> {
        self.env.set("ustate", "ok")
    }
}

impl Bootloader for EfiBootGuardAdapter {
    fn name(&self) -> &'static str {
        "efi-bootguard"
    }

    fn probe(&self) -> bool {
        self.config_path.exists()
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        self.env.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.env.set(key, value)
    }

    fn unset(&self, key: &str) -> Result<()> {
        self.env.unset(key)
    }

    fn apply_list(&self, pairs: &[(String, String)]) -> Result<()> {
        self.env.apply_list(pairs)
    }

    fn has_native_transactions(&self) -> bool {
        true
    }

    fn on_transaction_state(&self, state: TransactionState) -> Result<()> {
        match state {
            TransactionState::InProgress => self.create_new_environment_revision(),
            TransactionState::Testing => self.finalize(),
            TransactionState::Done => self.acknowledge(),
            TransactionState::Failed | TransactionState::Available => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> (tempfile::TempDir, EfiBootGuardAdapter) {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("ebg.config");
        std::fs::write(&config_path, "").unwrap();
        let adapter = EfiBootGuardAdapter::with_paths(dir.path().join("env"), config_path);
        (dir, adapter)
    }

    #[test]
    fn probes_available_only_when_config_exists() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = EfiBootGuardAdapter::with_paths(dir.path().join("env"), dir.path().join("missing.config"));
        assert!(!adapter.probe());
    }

    #[test]
    fn in_progress_creates_a_new_revision() {
        let (_dir, adapter) = adapter();
        adapter.on_transaction_state(TransactionState::InProgress).unwrap();
        assert_eq!(adapter.get("revision").unwrap(), Some("1".to_string()));
        assert_eq!(adapter.get("ustate").unwrap(), Some("installing".to_string()));
    }

    #[test]
    fn full_lifecycle_ends_acknowledged() {
        let (_dir, adapter) = adapter();
        adapter.on_transaction_state(TransactionState::InProgress).unwrap();
        adapter.on_transaction_state(TransactionState::Testing).unwrap();
        assert_eq!(adapter.get("ustate").unwrap(), Some("testing".to_string()));
        adapter.on_transaction_state(TransactionState::Done).unwrap();
        assert_eq!(adapter.get("ustate").unwrap(), Some("ok".to_string()));
    }

    #[test]
    fn failure_leaves_state_untouched() {
        let (_dir, adapter) = adapter();
        adapter.on_transaction_state(TransactionState::InProgress).unwrap();
        adapter.on_transaction_state(TransactionState::Failed).unwrap();
        assert_eq!(adapter.get("ustate").unwrap(), Some("installing".to_string()));
    }
}
