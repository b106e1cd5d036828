//! Generic retry-with-backoff for transient LLM transport errors.
//!
//! Distinct from `hdev-ratelimit`, which computes backoff from rate-limit
//! *headers*. This helper retries a fallible async operation a bounded
//! number of times with exponential backoff and jitter, and is meant to wrap
//! the LLM streaming call itself for the "Transient LLM (HTTP
//! 429/500/503/529)" row of the spec's error-handling table (§7).

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Backoff parameters for [`retry_with_backoff`].
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 2_u64.saturating_pow(attempt);
        let scaled = self.base_delay.saturating_mul(u32::try_from(exp).unwrap_or(u32::MAX));
        let capped = scaled.min(self.max_delay);
        let jitter_ms = rand::thread_rng().gen_range(0..=100);
        capped.saturating_add(Duration::from_millis(jitter_ms))
    }
}

/// Retry `op` up to `config.max_attempts` times, calling `is_retryable` on
/// each error to decide whether to try again.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or immediately once
/// `is_retryable` returns `false`.
pub async fn retry_with_backoff<T, E, Fut, Op, Retryable>(
    config: RetryConfig,
    mut op: Op,
    is_retryable: Retryable,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Retryable: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= config.max_attempts || !is_retryable(&err) {
                    return Err(err);
                }
                let delay = config.delay_for(attempt);
                tracing::warn!(attempt, ?delay, "retrying after transient error");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        let result: Result<u32, &str> = retry_with_backoff(
            config,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(n)
                    }
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_immediately_when_not_retryable() {
        let config = RetryConfig::default();
        let result: Result<(), &str> =
            retry_with_backoff(config, || async { Err("fatal") }, |_| false).await;
        assert_eq!(result, Err("fatal"));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let result: Result<(), &str> = retry_with_backoff(
            config,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("still failing") }
            },
            |_| true,
        )
        .await;
        assert_eq!(result, Err("still failing"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
