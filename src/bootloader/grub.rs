//! GRUB backend: another thin key/value wrapper, grounded on
//! `bootloader/grub.c`'s use of `grub-editenv` against `grubenv`. No
//! native transaction semantics; probes for the `grubenv` file.

use std::path::PathBuf;

use super::env_file::EnvFile;
use super::Bootloader;
use crate::error::Result;

const DEFAULT_GRUBENV_PATH: &str = "/boot/grub/grubenv";

pub struct GrubAdapter {
    env: EnvFile,
    grubenv_path: PathBuf,
}

impl Default for GrubAdapter {
    fn default() -> Self {
        GrubAdapter {
            env: EnvFile::new(PathBuf::from(DEFAULT_GRUBENV_PATH)),
            grubenv_path: PathBuf::from(DEFAULT_GRUBENV_PATH),
        }
    }
}

impl GrubAdapter {
    pub fn at(grubenv_path: impl Into<PathBuf>) -> Self {
        let grubenv_path = grubenv_path.into();
        GrubAdapter {
            env: EnvFile::new(grubenv_path.clone()),
            grubenv_path,
        }
    }
}

impl Bootloader for GrubAdapter {
    fn name(&self) -> &'static str {
        "grub"
    }

    fn probe(&self) -> bool {
        self.grubenv_path.exists()
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
    fn probes_available_only_when_grubenv_exists() {
        let dir = tempfile::tempdir().unwrap();
        let grubenv = dir.path().join("grubenv");
        let adapter = GrubAdapter::at(&grubenv);
        assert!(!adapter.probe());

        std::fs::write(&grubenv, "").unwrap();
        assert!(adapter.probe());
    }
}
