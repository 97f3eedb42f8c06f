//! Bounded retry with exponential backoff and a per-attempt timeout.

use std::future::Future;
use std::time::Duration;

use tracing::warn;
use watchdesk_core::config::RetryConfig;

use crate::error::SourceError;

/// Explicit retry policy for external calls.
///
/// Each attempt is wrapped in `attempt_timeout`; a timed-out attempt counts
/// as a retryable [`SourceError::Timeout`]. Delays double from `base_delay`
/// and are capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
    retryable: fn(&SourceError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(30),
            retryable: SourceError::is_retryable,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            attempt_timeout: Duration::from_secs(cfg.attempt_timeout_secs),
            retryable: SourceError::is_retryable,
        }
    }

    /// Single attempt, no retry. Still bounded by `attempt_timeout`.
    pub fn once(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout,
            ..Self::default()
        }
    }

    /// Replace the retryable-error predicate.
    pub fn with_predicate(mut self, retryable: fn(&SourceError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Returns the last error.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => SourceError::Timeout(self.attempt_timeout),
            };

            if attempt >= max || !(self.retryable)(&err) {
                return Err(err);
            }

            let mut delay = self.delay_for(attempt);
            if let SourceError::RateLimited {
                retry_after_secs: Some(secs),
            } = &err
            {
                delay = Duration::from_secs(*secs).min(self.max_delay);
            }
            warn!(
                op = op_name,
                attempt,
                max_attempts = max,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                error_class = err.class(),
                "retrying after transient failure"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            attempt_timeout: Duration::from_secs(5),
            retryable: SourceError::is_retryable,
        }
    }

    #[test]
    fn delays_double_and_cap() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let out = policy()
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(SourceError::Status { status: 502, body: String::new() })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let err = policy()
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(SourceError::Timeout(Duration::from_secs(1))) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = policy()
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(SourceError::QuotaExceeded("020".into())) }
            })
            .await
            .unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_for_retry_after() {
        let calls = AtomicU32::new(0);
        let p = RetryPolicy {
            max_delay: Duration::from_secs(60),
            ..policy()
        };
        let start = tokio::time::Instant::now();
        let out = p
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(SourceError::RateLimited {
                            retry_after_secs: Some(7),
                        })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 1);
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempt_times_out() {
        let p = RetryPolicy::once(Duration::from_secs(2));
        let err = p
            .run("test", || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, SourceError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout(d) if d == Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_predicate_can_disable_retries() {
        let calls = AtomicU32::new(0);
        let _ = policy()
            .with_predicate(|_| false)
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(SourceError::Timeout(Duration::from_secs(1))) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
