//! `WithRetry(op, timeout, attempts)` combinator (§9 design notes), replacing
//! the original's per-call `@retry` decorator with a single reusable
//! function. Exponential backoff between attempts is grounded on
//! `segment_grabber.rs`'s `100ms * 2^retries` scheme.

use std::future::Future;
use std::time::Duration;

/// Run `op` up to `attempts` times (so `attempts = 3` means at most two
/// retries after the first try), applying `per_attempt_timeout` to each call
/// and a capped exponential backoff between failures.
pub async fn with_retry<F, Fut, T, E>(
    attempts: u32,
    per_attempt_timeout: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<tokio::time::error::Elapsed>,
{
    let attempts = attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match tokio::time::timeout(per_attempt_timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => last_err = Some(e),
            Err(elapsed) => last_err = Some(E::from(elapsed)),
        }
        if attempt + 1 < attempts {
            let delay_ms = 100u64 * (1u64 << attempt.min(5));
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
    Err(last_err.expect("attempts >= 1 guarantees at least one recorded error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError;
    impl From<tokio::time::error::Elapsed> for TestError {
        fn from(_: tokio::time::error::Elapsed) -> Self {
            TestError
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_try() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> = with_retry(3, Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> = with_retry(3, Duration::from_secs(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestError)
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> = with_retry(2, Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
