//! Per-user rate limiting (§4.6). Grounded on `rate_limiter.py`'s
//! `RateLimiter`: a map of last-emit timestamps plus a minimum interval.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

pub struct RateLimiter {
    min_interval: f64,
    last_sent: Mutex<HashMap<i64, Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval_secs: f64) -> Self {
        Self {
            min_interval: min_interval_secs,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` when the caller may proceed, recording `now` as the new
    /// last-sent time in the same step. Returns `false` (and leaves the
    /// recorded time untouched) when the user is still inside the window.
    pub fn allow(&self, user_id: i64) -> bool {
        let now = Instant::now();
        let mut guard = self.last_sent.lock().unwrap();
        let elapsed_ok = match guard.get(&user_id) {
            Some(last) => now.duration_since(*last).as_secs_f64() >= self.min_interval,
            None => true,
        };
        if elapsed_ok {
            guard.insert(user_id, now);
        }
        elapsed_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_always_allowed() {
        let rl = RateLimiter::new(10.0);
        assert!(rl.allow(1));
    }

    #[test]
    fn immediate_second_call_is_throttled() {
        let rl = RateLimiter::new(10.0);
        assert!(rl.allow(1));
        assert!(!rl.allow(1));
    }

    #[test]
    fn zero_interval_never_throttles() {
        let rl = RateLimiter::new(0.0);
        assert!(rl.allow(1));
        assert!(rl.allow(1));
    }

    #[test]
    fn distinct_users_are_independent() {
        let rl = RateLimiter::new(10.0);
        assert!(rl.allow(1));
        assert!(rl.allow(2));
    }
}
