//! Bounded retry with exponential backoff and a per-call timeout for store reads.

use crate::utils::error::{ReconcileError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Wraps every store call with a timeout; reads additionally get retries.
#[derive(Debug, Clone)]
pub struct StoreCallGuard {
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl Default for StoreCallGuard {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), Duration::from_secs(30))
    }
}

impl StoreCallGuard {
    pub fn new(retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            retry,
            call_timeout,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Single attempt bounded by the call timeout.
    pub async fn once<F, T>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.call_timeout.as_millis() as u64,
            }),
        }
    }

    /// Retries retryable failures up to the policy's bound.
    pub async fn read<F, Fut, T>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match self.once(operation, call()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    debug!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying store read after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_guard(max_retries: u32) -> StoreCallGuard {
        StoreCallGuard::new(
            RetryPolicy {
                max_retries,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                backoff_multiplier: 2.0,
            },
            Duration::from_millis(200),
        )
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(5), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_read_retries_transient_failures() {
        let calls = AtomicU32::new(0);
        let guard = fast_guard(2);

        let result = guard
            .read("list", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ReconcileError::access(None, "unavailable"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_read_gives_up_after_bound() {
        let calls = AtomicU32::new(0);
        let guard = fast_guard(1);

        let result: Result<()> = guard
            .read("list", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ReconcileError::access(None, "unavailable"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let guard = fast_guard(3);

        let result: Result<()> = guard
            .read("list", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ReconcileError::config("broken"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_once_times_out() {
        let guard = StoreCallGuard::new(RetryPolicy::none(), Duration::from_millis(10));
        let result: Result<()> = guard
            .once("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ReconcileError::Timeout { .. })));
    }
}
