//! cboot (NVIDIA Tegra) backend: the last probe candidate, grounded on
//! `bootloader/cboot.c`'s use of the Tegra boot control partition. No
//! native transaction semantics here either; probes for the device node
//! the real implementation reads/writes.

use std::path::PathBuf;

use super::env_file::EnvFile;
use super::Bootloader;
use crate::error::Result;

const DEFAULT_BOOTCTRL_DEVICE: &str = "/dev/bootctrl";

pub struct CbootAdapter {
    env: EnvFile,
    bootctrl_device: PathBuf,
}

impl Default for CbootAdapter {
    fn default() -> Self {
        CbootAdapter {
            env: EnvFile::new(PathBuf::from("/etc/swupdate/cboot-env")),
            bootctrl_device: PathBuf::from(DEFAULT_BOOTCTRL_DEVICE),
        }
    }
}

impl CbootAdapter {
    pub fn with_paths(env_path: impl Into<PathBuf>, bootctrl_device: impl Into<PathBuf>) -> Self {
        CbootAdapter {
            env: EnvFile::new(env_path),
            bootctrl_device: bootctrl_device.into(),
        }
    }
}

impl Bootloader for CbootAdapter {
    fn name(&self) -> &'static str {
        "cboot"
    }

    fn probe(&self) -> bool {
        self.bootctrl_device.exists()
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
    fn probes_available_only_when_bootctrl_device_exists() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("bootctrl");
        let adapter = CbootAdapter::with_paths(dir.path().join("env"), &device);
        assert!(!adapter.probe());

        std::fs::write(&device, "").unwrap();
        assert!(adapter.probe());
    }
}
