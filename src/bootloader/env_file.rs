//! Shared `key=value`-per-line environment file backing store used by
//! the U-Boot, GRUB, none/file and cboot adapters. Each real backend
//! talks to its own tool (`fw_printenv`/`fw_setenv`, `grub-editenv`,
//! an extlinux config...); this crate has no binding to any of them, so
//! each adapter is grounded on the same plain-text key/value file
//! `core/fw_env.c`'s U-Boot environment ultimately boils down to,
//! parameterized by path and probe condition.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

pub struct EnvFile {
    path: PathBuf,
    cache: Mutex<Option<BTreeMap<String, String>>>,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        EnvFile {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(parse(&text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(Error::OpenFile(self.path.clone(), err)),
        }
    }

    fn save(&self, vars: &BTreeMap<String, String>) -> Result<()> {
        let text = render(vars);
        std::fs::write(&self.path, text).map_err(|err| Error::OpenFile(self.path.clone(), err))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let mut cache = self.cache.lock().unwrap();
        if cache.is_none() {
            *cache = Some(self.load()?);
        }
        Ok(cache.as_ref().unwrap().get(key).cloned())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut cache = self.cache.lock().unwrap();
        let mut vars = self.load()?;
        vars.insert(key.to_string(), value.to_string());
        self.save(&vars)?;
        *cache = Some(vars);
        Ok(())
    }

    pub fn unset(&self, key: &str) -> Result<()> {
        let mut cache = self.cache.lock().unwrap();
        let mut vars = self.load()?;
        vars.remove(key);
        self.save(&vars)?;
        *cache = Some(vars);
        Ok(())
    }

    /// Writes every pair in one load-modify-save cycle: as atomic as a
    /// single-file adapter can offer, but a crash mid-write still leaves
    /// a torn file (§9 open question; no rename-based atomicity here).
    pub fn apply_list(&self, pairs: &[(String, String)]) -> Result<()> {
        let mut cache = self.cache.lock().unwrap();
        let mut vars = self.load()?;
        for (key, value) in pairs {
            vars.insert(key.clone(), value.clone());
        }
        self.save(&vars)?;
        *cache = Some(vars);
        Ok(())
    }
}

fn parse(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn render(vars: &BTreeMap<String, String>) -> String {
    vars.iter().map(|(k, v)| format!("{k}={v}\n")).collect()
}

pub fn probe_path_exists(path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvFile::new(dir.path().join("env"));
        env.set("recovery_status", "1").unwrap();
        assert_eq!(env.get("recovery_status").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn unset_removes_key() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvFile::new(dir.path().join("env"));
        env.set("a", "1").unwrap();
        env.unset("a").unwrap();
        assert_eq!(env.get("a").unwrap(), None);
    }

    #[test]
    fn apply_list_writes_every_pair() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvFile::new(dir.path().join("env"));
        env.apply_list(&[("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]).unwrap();
        assert_eq!(env.get("a").unwrap(), Some("1".to_string()));
        assert_eq!(env.get("b").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvFile::new(dir.path().join("does-not-exist"));
        assert_eq!(env.get("anything").unwrap(), None);
    }
}
