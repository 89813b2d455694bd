// ABOUTME: AI gateway module root: retry machinery shared by upstream providers
// ABOUTME: Linear backoff with explicit transience classification, fatal errors short-circuit
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # AI Gateway
//!
//! [`gemini`] speaks the upstream wire format; this module owns the
//! retry loop it runs under. Retrying is opt-in per error: an error
//! must declare itself transient ([`Transient`]) to earn another
//! attempt, so a rejected request (bad API key, malformed body) fails
//! fast instead of burning the retry budget.

pub mod gemini;

pub use gemini::GeminiGateway;

use std::future::Future;
use std::time::Duration;

/// Errors that can declare themselves worth retrying
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Bounded linear-backoff retry policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Attempt N (1-based) waits N * base_delay before the next try
    pub base_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the given 1-based attempt number
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Outcome of a retried operation
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// Some attempt succeeded
    Ok(T),
    /// Every attempt failed with a transient error; carries the last one
    Exhausted(E),
    /// An attempt failed with a non-transient error; no further tries
    Fatal(E),
}

/// Run an operation under the retry policy
///
/// Transient failures sleep `attempt * base_delay` and try again until
/// the attempt budget runs out. The first non-transient failure stops
/// the loop immediately.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> RetryOutcome<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return RetryOutcome::Ok(value),
            Err(error) if !error.is_transient() => return RetryOutcome::Fatal(error),
            Err(error) => {
                if attempt >= policy.max_attempts {
                    return RetryOutcome::Exhausted(error);
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "transient upstream failure, retrying: {error}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (transient={})", self.transient)
        }
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let outcome = retry_with_backoff(policy(), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(TestError { transient: true })
            } else {
                Ok(n)
            }
        })
        .await;

        match outcome {
            RetryOutcome::Ok(3) => {}
            other => panic!("expected Ok(3), got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let outcome: RetryOutcome<u32, TestError> = retry_with_backoff(policy(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError { transient: true })
        })
        .await;

        assert!(matches!(outcome, RetryOutcome::Exhausted(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let outcome: RetryOutcome<u32, TestError> = retry_with_backoff(policy(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError { transient: false })
        })
        .await;

        assert!(matches!(outcome, RetryOutcome::Fatal(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_grows_linearly() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    }
}
