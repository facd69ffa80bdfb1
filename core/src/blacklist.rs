//! Persistent user blacklist (§6 admin commands), grounded on
//! `handlers/blacklist.py`'s add/remove-by-prefix `/blacklist` command,
//! backed by the same atomic JSON protocol as the handle cache.

use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::persist::AtomicJsonStore;

pub struct Blacklist {
    store: AtomicJsonStore,
    ids: RwLock<Vec<i64>>,
}

impl Blacklist {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let store = AtomicJsonStore::new(path);
        let ids = store.load(Vec::new());
        Self {
            store,
            ids: RwLock::new(ids),
        }
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.ids.read().unwrap().contains(&user_id)
    }

    pub fn list(&self) -> Vec<i64> {
        self.ids.read().unwrap().clone()
    }

    /// Add `user_id`; returns `false` if already present (matching the
    /// `already` bucket of `handle_blacklist_command`).
    pub fn add(&self, user_id: i64) -> Result<bool, StoreError> {
        {
            let mut guard = self.ids.write().unwrap();
            if guard.contains(&user_id) {
                return Ok(false);
            }
            guard.push(user_id);
            guard.sort_unstable();
            guard.dedup();
        }
        self.persist()?;
        Ok(true)
    }

    /// Remove `user_id`; returns `false` if it wasn't present (`not_in` bucket).
    pub fn remove(&self, user_id: i64) -> Result<bool, StoreError> {
        let removed = {
            let mut guard = self.ids.write().unwrap();
            let before = guard.len();
            guard.retain(|id| *id != user_id);
            guard.len() != before
        };
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    fn persist(&self) -> Result<(), StoreError> {
        let snapshot = self.ids.read().unwrap().clone();
        self.store.persist(&snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_contains() {
        let dir = tempfile::tempdir().unwrap();
        let bl = Blacklist::load(dir.path().join("blacklist.json"));
        assert!(bl.add(42).unwrap());
        assert!(bl.contains(42));
    }

    #[test]
    fn add_twice_reports_already_present() {
        let dir = tempfile::tempdir().unwrap();
        let bl = Blacklist::load(dir.path().join("blacklist.json"));
        assert!(bl.add(42).unwrap());
        assert!(!bl.add(42).unwrap());
    }

    #[test]
    fn remove_missing_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        let bl = Blacklist::load(dir.path().join("blacklist.json"));
        assert!(!bl.remove(7).unwrap());
    }

    #[test]
    fn remove_existing_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist.json");
        {
            let bl = Blacklist::load(&path);
            bl.add(1).unwrap();
            bl.add(2).unwrap();
            assert!(bl.remove(1).unwrap());
        }
        let reloaded = Blacklist::load(&path);
        assert!(!reloaded.contains(1));
        assert!(reloaded.contains(2));
    }
}
