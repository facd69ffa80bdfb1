//! Shared atomic-JSON-file persistence helper, used by the handle cache,
//! the usage recorder, and the blacklist store (§4.1, §4.7).
//!
//! Protocol: serialize to `<name>_tmp.json`, fsync, rotate the live file to
//! `<name>_backup.json`, then rename the tmp file into place. A crash at any
//! point during a write leaves either the previous file or the new one
//! fully intact — never a half-written one.

use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub struct AtomicJsonStore {
    path: PathBuf,
    backup_path: PathBuf,
    tmp_path: PathBuf,
}

impl AtomicJsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("store")
            .to_string();
        let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        Self {
            backup_path: dir.join(format!("{stem}_backup.json")),
            tmp_path: dir.join(format!("{stem}_tmp.json")),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the live file, returning `default` on any I/O or parse
    /// failure rather than refusing to start.
    pub fn load<T: serde::de::DeserializeOwned>(&self, default: T) -> T {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("[persist] failed to parse {:?}: {}", self.path, e);
                default
            }),
            Err(_) => default,
        }
    }

    /// Write `value` through the rotate-and-replace protocol.
    pub fn persist<T: serde::Serialize>(&self, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value)?;
        write_atomic(&self.tmp_path, &json)?;

        if self.path.exists() {
            if let Err(e) = std::fs::rename(&self.path, &self.backup_path) {
                log::warn!("[persist] could not rotate backup {:?}: {}", self.backup_path, e);
            }
        }
        std::fs::rename(&self.tmp_path, &self.path)?;
        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = AtomicJsonStore::new(dir.path().join("blacklist.json"));
        store.persist(&vec![1i64, 2, 3]).unwrap();
        let loaded: Vec<i64> = store.load(Vec::new());
        assert_eq!(loaded, vec![1, 2, 3]);
    }

    #[test]
    fn second_persist_rotates_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = AtomicJsonStore::new(dir.path().join("blacklist.json"));
        store.persist(&vec![1i64]).unwrap();
        store.persist(&vec![1i64, 2]).unwrap();
        assert!(dir.path().join("blacklist_backup.json").exists());
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = AtomicJsonStore::new(dir.path().join("nope.json"));
        let loaded: Vec<i64> = store.load(Vec::new());
        assert!(loaded.is_empty());
    }
}
