//! Per-user task gating (§4.6): "one in-flight download per user at a time".
//!
//! Grounded on `task_manager.py`'s `TaskManager`, which wraps a per-user
//! `asyncio.Lock` but only ever uses it non-blockingly (`if lock.locked():
//! return False`). A plain guarded set reproduces that observable behavior
//! without pretending we need an actual awaitable lock.

use std::collections::HashSet;
use std::sync::Mutex;

pub struct TaskManager {
    active: Mutex<HashSet<i64>>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Try to claim the slot for `user_id`. `true` on success, `false` if
    /// another task for the same user is already running.
    pub fn acquire(&self, user_id: i64) -> bool {
        self.active.lock().unwrap().insert(user_id)
    }

    pub fn release(&self, user_id: i64) {
        self.active.lock().unwrap().remove(&user_id);
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }
}

/// RAII guard releasing a [`TaskManager`] slot on drop, so an early return or
/// panic in the driver can never leak a stuck lock.
pub struct TaskGuard<'a> {
    manager: &'a TaskManager,
    user_id: i64,
}

impl<'a> TaskGuard<'a> {
    /// Attempt to acquire; returns `None` if the user already has a task running.
    pub fn acquire(manager: &'a TaskManager, user_id: i64) -> Option<Self> {
        if manager.acquire(user_id) {
            Some(Self { manager, user_id })
        } else {
            None
        }
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_for_same_user_fails() {
        let tm = TaskManager::new();
        assert!(tm.acquire(1));
        assert!(!tm.acquire(1));
    }

    #[test]
    fn release_frees_the_slot() {
        let tm = TaskManager::new();
        assert!(tm.acquire(1));
        tm.release(1);
        assert!(tm.acquire(1));
    }

    #[test]
    fn guard_releases_on_drop() {
        let tm = TaskManager::new();
        {
            let _g = TaskGuard::acquire(&tm, 7).unwrap();
            assert_eq!(tm.active_count(), 1);
        }
        assert_eq!(tm.active_count(), 0);
    }

    #[test]
    fn distinct_users_do_not_contend() {
        let tm = TaskManager::new();
        assert!(tm.acquire(1));
        assert!(tm.acquire(2));
        assert_eq!(tm.active_count(), 2);
    }
}
