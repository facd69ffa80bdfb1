//! Persistent handle cache (§4.1): `<vid, HandleCacheEntry>` backed by a JSON
//! file, written with the temp-file + fsync + rotate protocol so a crash
//! mid-write can never corrupt the live file.
//!
//! Grounded on the original `file_cache.py` (load/get/put/save shape) plus
//! `handlers/cache.py` (the legacy "value is a bare string" compatibility
//! path that `get_full` has to paper over).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::persist::AtomicJsonStore;
use crate::types::HandleCacheEntry;

/// On-disk shape tolerates the legacy format where a value was a bare string
/// file_id instead of a full entry object (noted in `handlers/cache.py`'s
/// `isinstance(entry, dict)` branch).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Legacy(String),
    Entry(HandleCacheEntry),
}

/// In-memory handle cache with atomic on-disk persistence.
pub struct HandleCache {
    store: AtomicJsonStore,
    entries: RwLock<HashMap<String, StoredValue>>,
}

impl HandleCache {
    /// Load from `path` if it exists, starting empty and logging a warning
    /// on any parse failure rather than refusing to start (§4.1).
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let store = AtomicJsonStore::new(path);
        let entries = store.load(HashMap::new());
        Self {
            store,
            entries: RwLock::new(entries),
        }
    }

    /// Look up a key, returning only the remote handle — the common case for
    /// cache-hit delivery.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_full(key).map(|e| match e.file_id {
            crate::types::FileHandle::Single(s) => s,
            crate::types::FileHandle::Many(v) => v.join(","),
        })
    }

    /// Look up a key, returning the full entry. Legacy bare-string values are
    /// upgraded into a minimal entry on the fly.
    pub fn get_full(&self, key: &str) -> Option<HandleCacheEntry> {
        let guard = self.entries.read().unwrap();
        match guard.get(key)? {
            StoredValue::Entry(e) => Some(e.clone()),
            StoredValue::Legacy(s) => Some(HandleCacheEntry::simple(String::new(), s.clone())),
        }
    }

    /// Insert or replace an entry and persist immediately (§4.1: every write
    /// is flushed before the call returns, matching the original's save-on-put).
    pub fn put(&self, key: impl Into<String>, entry: HandleCacheEntry) -> Result<(), StoreError> {
        let key = key.into();
        if entry.file_id.is_empty() {
            log::error!("[cache] refusing to cache empty file_id for key={key}");
            return Ok(());
        }
        {
            let mut guard = self.entries.write().unwrap();
            guard.insert(key, StoredValue::Entry(entry));
        }
        self.persist()
    }

    /// Remove a key, returning whether it was present, and persist the change.
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let removed = {
            let mut guard = self.entries.write().unwrap();
            guard.remove(key).is_some()
        };
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    /// All keys in insertion order, for `/showcache` style admin listing.
    pub fn title_pairs(&self) -> Vec<(String, String)> {
        let guard = self.entries.read().unwrap();
        guard
            .iter()
            .map(|(k, v)| {
                let title = match v {
                    StoredValue::Entry(e) => e.title.clone(),
                    StoredValue::Legacy(_) => String::new(),
                };
                (k.clone(), title)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomic write via the shared rotate-and-replace protocol (§4.1).
    fn persist(&self) -> Result<(), StoreError> {
        let snapshot: HashMap<String, Value> = {
            let guard = self.entries.read().unwrap();
            guard
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        StoredValue::Entry(e) => serde_json::to_value(e).unwrap_or(Value::Null),
                        StoredValue::Legacy(s) => Value::String(s.clone()),
                    };
                    (k.clone(), value)
                })
                .collect()
        };
        let count = snapshot.len();
        self.store.persist(&snapshot)?;
        log::info!("[cache] persisted {} entries to {:?}", count, self.store.path());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HandleCacheEntry;

    #[test]
    fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HandleCache::load(dir.path().join("cache.json"));
        cache.put("v1", HandleCacheEntry::simple("title", "handle-1")).unwrap();
        assert_eq!(cache.get("v1"), Some("handle-1".to_string()));
    }

    #[test]
    fn reload_from_disk_after_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        {
            let cache = HandleCache::load(&path);
            cache.put("v1", HandleCacheEntry::simple("title", "handle-1")).unwrap();
        }
        let reloaded = HandleCache::load(&path);
        assert_eq!(reloaded.get("v1"), Some("handle-1".to_string()));
        assert!(dir.path().join("cache_backup.json").exists() == false);
    }

    #[test]
    fn backup_created_on_second_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = HandleCache::load(&path);
        cache.put("v1", HandleCacheEntry::simple("t1", "h1")).unwrap();
        cache.put("v2", HandleCacheEntry::simple("t2", "h2")).unwrap();
        assert!(dir.path().join("cache_backup.json").exists());
        assert!(path.exists());
    }

    #[test]
    fn empty_file_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HandleCache::load(dir.path().join("cache.json"));
        cache
            .put("v1", HandleCacheEntry::simple("t", ""))
            .unwrap();
        assert_eq!(cache.get("v1"), None);
    }

    #[test]
    fn legacy_bare_string_value_upgrades_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"v1":"legacy-handle"}"#).unwrap();
        let cache = HandleCache::load(&path);
        assert_eq!(cache.get("v1"), Some("legacy-handle".to_string()));
    }

    #[test]
    fn delete_missing_key_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HandleCache::load(dir.path().join("cache.json"));
        assert_eq!(cache.delete("nope").unwrap(), false);
    }
}
