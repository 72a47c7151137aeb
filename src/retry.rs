//! Rate-limit aware retry with exponential backoff and jitter
//!
//! Collaborators classify their own failures through `Retryable`; only
//! rate-limit signals are retried, everything else fails immediately.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

/// Classification of a collaborator error for retry purposes.
pub trait Retryable {
    /// True if the failure is a rate-limit signal worth waiting out.
    fn is_rate_limited(&self) -> bool;

    /// Server-provided hint for how long to wait, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Backoff parameters.
///
/// Delay for attempt `n` (zero-based) is `min(base * 2^n, cap)` plus a
/// uniform jitter in `jitter_min..=jitter_max`, and never shorter than the
/// collaborator's retry hint. Retrying stops once the next sleep would
/// cross the deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    /// Longest total time spent retrying one operation
    pub max_elapsed: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(10),
            cap: Duration::from_secs(60),
            jitter_min: Duration::from_secs(2),
            jitter_max: Duration::from_secs(4),
            max_elapsed: Duration::from_secs(900),
        }
    }
}

impl BackoffPolicy {
    /// Policy without jitter, handy for deterministic tests
    pub fn fixed(base: Duration, cap: Duration, max_elapsed: Duration) -> Self {
        Self {
            base,
            cap,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            max_elapsed,
        }
    }

    /// Backoff delay before retry number `attempt + 1`, excluding jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base.saturating_mul(factor).min(self.cap)
    }

    fn jitter(&self) -> Duration {
        if self.jitter_max <= self.jitter_min {
            return self.jitter_min;
        }
        let min = self.jitter_min.as_millis() as u64;
        let max = self.jitter_max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Deadline for a retry loop starting now
    pub fn deadline_from(&self, start: Instant) -> Instant {
        start + self.max_elapsed
    }
}

/// Why a retried operation ultimately failed
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// A failure that is not worth retrying
    #[error("{0}")]
    Fatal(#[source] E),
    /// Still rate limited when the retry window closed
    #[error("still rate limited after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::Fatal(e) => e,
            Self::Exhausted { last, .. } => last,
        }
    }
}

/// Run `op` until it succeeds, fails with a non rate-limit error, or the
/// next backoff would cross `deadline`.
pub async fn with_backoff<T, E, F, Fut>(
    policy: &BackoffPolicy,
    deadline: Instant,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + Retryable + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        attempt += 1;

        if !err.is_rate_limited() {
            return Err(RetryError::Fatal(err));
        }

        let mut delay = policy.backoff(attempt - 1) + policy.jitter();
        if let Some(hint) = err.retry_after() {
            delay = delay.max(hint);
        }
        if Instant::now() + delay >= deadline {
            return Err(RetryError::Exhausted { attempts: attempt, last: err });
        }

        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Rate limited, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Error)]
    enum TestError {
        #[error("slow down")]
        Throttled(Option<Duration>),
        #[error("broken")]
        Broken,
    }

    impl Retryable for TestError {
        fn is_rate_limited(&self) -> bool {
            matches!(self, Self::Throttled(_))
        }

        fn retry_after(&self) -> Option<Duration> {
            match self {
                Self::Throttled(hint) => *hint,
                Self::Broken => None,
            }
        }
    }

    fn policy() -> BackoffPolicy {
        BackoffPolicy::fixed(
            Duration::from_secs(10),
            Duration::from_secs(60),
            Duration::from_secs(900),
        )
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let p = policy();
        assert_eq!(p.backoff(0), Duration::from_secs(10));
        assert_eq!(p.backoff(1), Duration::from_secs(20));
        assert_eq!(p.backoff(2), Duration::from_secs(40));
        assert_eq!(p.backoff(3), Duration::from_secs(60));
        assert_eq!(p.backoff(30), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_in_range() {
        let p = BackoffPolicy::default();
        for _ in 0..50 {
            let j = p.jitter();
            assert!(j >= p.jitter_min && j <= p.jitter_max);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limits_then_succeeds() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result: Result<u32, RetryError<TestError>> =
            with_backoff(&policy(), start + Duration::from_secs(900), || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TestError::Throttled(None))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        // 10s + 20s of backoff under the paused clock
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(
            &policy(),
            Instant::now() + Duration::from_secs(900),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Broken)
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::Fatal(TestError::Broken))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_retrying() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result: Result<(), _> =
            with_backoff(&policy(), start + Duration::from_secs(35), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Throttled(None))
            })
            .await;

        // Sleeps 10s and 20s; the next 40s sleep would cross the deadline
        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {:?}", other.map(|_| ())),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_hint_extends_delay() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let _: Result<(), _> = with_backoff(
            &policy(),
            start + Duration::from_secs(900),
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TestError::Throttled(Some(Duration::from_secs(45))))
                } else {
                    Ok(())
                }
            },
        )
        .await;
        assert_eq!(start.elapsed(), Duration::from_secs(45));
    }
}
