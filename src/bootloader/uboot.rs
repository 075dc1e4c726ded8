//! U-Boot backend: a thin key/value wrapper. The real implementation
//! talks to `libubootenv`/`fw_printenv`/`fw_setenv` against the device's
//! environment partition (`core/fw_env.c`); here it is the same
//! key/value file abstraction, probing for the environment config file
//! U-Boot tooling itself expects to find.

use std::path::PathBuf;

use super::env_file::EnvFile;
use super::Bootloader;
use crate::error::Result;

const DEFAULT_CONFIG_PATH: &str = "/etc/fw_env.config";

pub struct UBootAdapter {
    env: EnvFile,
    config_path: PathBuf,
}

impl Default for UBootAdapter {
    fn default() -> Self {
        UBootAdapter {
            env: EnvFile::new(PathBuf::from("/etc/swupdate/uboot-env")),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }
}

impl UBootAdapter {
    pub fn with_paths(env_path: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        UBootAdapter {
            env: EnvFile::new(env_path),
            config_path: config_path.into(),
        }
    }
}

impl Bootloader for UBootAdapter {
    fn name(&self) -> &'static str {
        "u-boot"
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_available_only_when_config_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("fw_env.config");
        let adapter = UBootAdapter::with_paths(dir.path().join("env"), &config_path);
        assert!(!adapter.probe());

        std::fs::write(&config_path, "/dev/mtd0 0x0 0x4000\n").unwrap();
        assert!(adapter.probe());
    }

    #[test]
    fn get_set_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = UBootAdapter::with_paths(dir.path().join("env"), dir.path().join("fw_env.config"));
        adapter.set("upgrade_available", "1").unwrap();
        assert_eq!(adapter.get("upgrade_available").unwrap(), Some("1".to_string()));
    }
}
