// =============================================================================
// utils/retry.rs
// =============================================================================
// Helper: with_retry - per-attempt timeout + exponential backoff + full jitter
// Wraps the gate-check RPC lookups; the feed reconnect loop deliberately does
// NOT use this (it retries forever on a fixed delay instead).
// =============================================================================

use anyhow::Result;
use rand::Rng;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Base backoff (ms)
const BACKOFF_BASE_MS: u64 = 50;
/// Maximum backoff cap (ms)
const BACKOFF_MAX_MS: u64 = 5000;

/// Retry policy for a single external lookup.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Max attempts including the first.
    pub attempts: usize,
    /// Timeout applied to each attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_millis(1500),
        }
    }
}

/// Call async closure `op` with standardized retry/backoff logic.
///
/// Returns the first success, or the last error once attempts are exhausted.
pub async fn with_retry<F, Fut, T>(policy: RetryPolicy, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match timeout(policy.timeout, op()).await {
            Ok(res) => res,
            Err(_) => {
                if attempt >= policy.attempts {
                    return Err(anyhow::anyhow!(
                        "lookup timed out after {} attempts",
                        policy.attempts
                    ));
                }
                let backoff_ms = backoff_with_jitter(attempt);
                tracing::debug!(
                    "lookup timed out (attempt {}/{}), retrying in {}ms",
                    attempt,
                    policy.attempts,
                    backoff_ms
                );
                sleep(Duration::from_millis(backoff_ms)).await;
                continue;
            }
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= policy.attempts {
                    return Err(e);
                }
                let backoff_ms = backoff_with_jitter(attempt);
                tracing::debug!(
                    "lookup failed (attempt {}/{}): {}, retrying in {}ms",
                    attempt,
                    policy.attempts,
                    e,
                    backoff_ms
                );
                sleep(Duration::from_millis(backoff_ms)).await;
            }
        }
    }
}

/// random(0, min(BACKOFF_MAX_MS, BACKOFF_BASE_MS * 2^(attempt-1)))
fn backoff_with_jitter(attempt: usize) -> u64 {
    let mut rng = rand::thread_rng();
    let exp_backoff =
        BACKOFF_BASE_MS.saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1) as u32));
    let capped_backoff = exp_backoff.min(BACKOFF_MAX_MS);
    rng.gen_range(0..=capped_backoff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        assert!(backoff_with_jitter(1) <= BACKOFF_BASE_MS);
        assert!(backoff_with_jitter(2) <= BACKOFF_BASE_MS * 2);
        assert!(backoff_with_jitter(3) <= BACKOFF_BASE_MS * 4);
        assert!(backoff_with_jitter(20) <= BACKOFF_MAX_MS);
    }

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let result = with_retry(RetryPolicy::default(), || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_exhaustion() {
        let result: Result<i32> = with_retry(RetryPolicy::default(), || async {
            Err(anyhow::anyhow!("permanent failure"))
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_retry_eventually_succeeds() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = AtomicUsize::new(0);
        let result = with_retry(RetryPolicy::default(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow::anyhow!("transient"))
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
