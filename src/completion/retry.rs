//! Bounded retry with linear backoff for completion calls
//!
//! An explicit loop rather than recursion, so retry depth never grows the
//! call stack. Backoff is linear: the wait before attempt `k+1` is
//! `k × base_delay`.

use std::time::Duration;

use crate::Result;

/// Retry policy for the completion call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,
    /// Backoff unit; attempt `k` waits `k × base_delay`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given retry count and the default backoff unit
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }
}

/// Delay before the given 1-based retry attempt
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy.base_delay.saturating_mul(attempt)
}

/// Run `op`, retrying transient failures up to `policy.max_retries` times.
///
/// Non-retryable failures (rate limiting, configuration/quota problems)
/// surface immediately; the final failure is surfaced as-is.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && e.is_retryable() => {
                attempt += 1;
                let delay = delay_for_attempt(policy, attempt);
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis(),
                    "completion failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
