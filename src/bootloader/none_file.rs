//! The `none`/file backend: a plain file-backed key/value store with no
//! native transaction semantics, used on devices with no real
//! bootloader integration (development boards, containers, CI). Always
//! probes as available so it can serve as the final fallback.

use std::path::PathBuf;

use super::env_file::EnvFile;
use super::Bootloader;
use crate::error::Result;

pub struct NoneFileAdapter {
    env: EnvFile,
}

impl Default for NoneFileAdapter {
    fn default() -> Self {
        NoneFileAdapter {
            env: EnvFile::new(PathBuf::from("/etc/swupdate/bootloader-env")),
        }
    }
}

impl NoneFileAdapter {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        NoneFileAdapter { env: EnvFile::new(path) }
    }
}

impl Bootloader for NoneFileAdapter {
    fn name(&self) -> &'static str {
        "none-file"
    }

    fn probe(&self) -> bool {
        true
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_probes_available() {
        assert!(NoneFileAdapter::default().probe());
    }

    #[test]
    fn get_set_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = NoneFileAdapter::at(dir.path().join("env"));
        adapter.set("recovery_status", "1").unwrap();
        assert_eq!(adapter.get("recovery_status").unwrap(), Some("1".to_string()));
    }
}
