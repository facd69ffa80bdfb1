//! Append-only per-user usage log (§3 `UsageRecord`, §4.7), grounded on
//! `recorder_parse.py`'s `_record_user_parse`: every parse attempt — cache
//! hit or not — is appended, keyed by `uid`, through the same atomic
//! rotate-and-replace protocol as the handle cache.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::persist::AtomicJsonStore;
use crate::types::UsageRecord;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserRecords {
    records: Vec<UsageRecord>,
}

pub struct UsageRecorder {
    store: AtomicJsonStore,
    by_user: Mutex<HashMap<String, UserRecords>>,
}

impl UsageRecorder {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let store = AtomicJsonStore::new(path);
        let by_user = store.load(HashMap::new());
        Self {
            store,
            by_user: Mutex::new(by_user),
        }
    }

    /// Clamp a raw elapsed-time measurement to the §4.7 rule: negative
    /// durations floor to zero, anything past an hour is treated as a bad
    /// measurement and dropped rather than recorded.
    pub fn clamp_work_time(raw_secs: f64) -> Option<f64> {
        if raw_secs < 0.0 {
            Some(0.0)
        } else if raw_secs > 3600.0 {
            None
        } else {
            Some((raw_secs * 100.0).round() / 100.0)
        }
    }

    /// Append `record` under `record.uid`. For a non-cache-hit record, a
    /// duplicate `(uid, vid)` already on file as a non-cache-hit is
    /// suppressed (§4.7); cache-hit records are never deduplicated, since
    /// each hit is its own statistical event.
    pub fn record(&self, record: UsageRecord) -> Result<(), StoreError> {
        let uid_key = record.uid.to_string();
        let mut wrote = false;
        {
            let mut guard = self.by_user.lock().unwrap();
            let entry = guard.entry(uid_key).or_default();
            let is_dup = !record.is_cached_hit
                && entry
                    .records
                    .iter()
                    .any(|r| !r.is_cached_hit && r.vid == record.vid);
            if !is_dup {
                entry.records.push(record);
                wrote = true;
            }
        }
        if wrote {
            self.persist()
        } else {
            Ok(())
        }
    }

    /// `(uid, uname, full_name)` of every user with at least one record,
    /// taken from their first entry — mirrors `load_users()`.
    pub fn known_users(&self) -> Vec<(i64, String, String)> {
        let guard = self.by_user.lock().unwrap();
        guard
            .iter()
            .filter_map(|(uid, recs)| {
                let first = recs.records.first()?;
                let uid: i64 = uid.parse().ok()?;
                Some((uid, first.uname.clone(), first.full_name.clone()))
            })
            .collect()
    }

    pub fn records_for(&self, uid: i64) -> Vec<UsageRecord> {
        self.by_user
            .lock()
            .unwrap()
            .get(&uid.to_string())
            .map(|r| r.records.clone())
            .unwrap_or_default()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let snapshot = self.by_user.lock().unwrap().clone();
        self.store.persist(&snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(uid: i64, vid: &str, cached: bool) -> UsageRecord {
        UsageRecord {
            timestamp: "2026-01-01T00:00:00".to_string(),
            uid,
            uname: "alice".to_string(),
            full_name: "Alice A".to_string(),
            platform: "douyin".to_string(),
            input_text: "https://example.com".to_string(),
            url: "https://example.com".to_string(),
            vid: vid.to_string(),
            title: "title".to_string(),
            parsed_url: String::new(),
            size_mb: 1.0,
            is_cached_hit: cached,
            parse_success: true,
            parse_exception: None,
            work_time_s: Some(0.5),
            cache_info: None,
        }
    }

    #[test]
    fn clamp_negative_floors_to_zero() {
        assert_eq!(UsageRecorder::clamp_work_time(-1.0), Some(0.0));
    }

    #[test]
    fn clamp_over_an_hour_drops_the_value() {
        assert_eq!(UsageRecorder::clamp_work_time(3601.0), None);
    }

    #[test]
    fn clamp_rounds_to_two_decimals() {
        assert_eq!(UsageRecorder::clamp_work_time(1.23456), Some(1.23));
    }

    #[test]
    fn duplicate_non_cache_hit_for_same_vid_is_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = UsageRecorder::load(dir.path().join("usage.json"));
        recorder.record(sample(1, "v1", false)).unwrap();
        recorder.record(sample(1, "v1", false)).unwrap();
        assert_eq!(recorder.records_for(1).len(), 1);
    }

    #[test]
    fn cache_hit_records_are_never_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = UsageRecorder::load(dir.path().join("usage.json"));
        recorder.record(sample(1, "v1", false)).unwrap();
        recorder.record(sample(1, "v1", true)).unwrap();
        recorder.record(sample(1, "v1", true)).unwrap();
        assert_eq!(recorder.records_for(1).len(), 3);
    }

    #[test]
    fn known_users_reports_first_record_identity() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = UsageRecorder::load(dir.path().join("usage.json"));
        recorder.record(sample(1, "v1", false)).unwrap();
        let users = recorder.known_users();
        assert_eq!(users, vec![(1, "alice".to_string(), "Alice A".to_string())]);
    }
}
