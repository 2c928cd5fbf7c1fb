//! Bounded fixed-delay retry for startup preconditions.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Retry ceiling and backoff interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first. Values below 1 are
    /// treated as 1.
    pub max_attempts: u32,
    /// Fixed wait between a failed attempt and the next one.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
        }
    }

    /// Effective number of attempts.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}

/// Runs `attempt` until it succeeds or the policy's budget is spent.
///
/// Sleeps `retry_delay` after every failed attempt except the last. The
/// closure receives the 1-based attempt number.
///
/// # Errors
///
/// Returns the error of the final attempt once all attempts have failed.
pub async fn retry_with_policy<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max = policy.attempts();
    let mut n = 1;
    loop {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(e) if n >= max => {
                tracing::error!(operation, attempt = n, max_attempts = max, error = %e, "giving up");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(operation, attempt = n, max_attempts = max, error = %e, "attempt failed, retrying");
                tokio::time::sleep(policy.retry_delay).await;
                n += 1;
            }
        }
    }
}
