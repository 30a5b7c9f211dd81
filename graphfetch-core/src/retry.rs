//! Bounded retry with exponential backoff.

use crate::config::RetryConfig;
use crate::error::FetchError;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// How many times to try a query and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            multiplier: config.backoff_multiplier,
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay after the failed attempt `attempt` (0-based): the initial
    /// backoff multiplied `attempt` times, capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// The last error once a policy gives up.
#[derive(Debug)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: FetchError,
}

impl fmt::Display for RetryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} attempt(s))", self.error, self.attempts)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempts run out. Sleeps between attempts; never after the last one.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;
    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_retryable() || attempts >= max_attempts {
                    return Err(RetryFailure { attempts, error });
                }
                let backoff = policy.backoff_for(attempts - 1);
                tracing::warn!(
                    attempt = attempts,
                    max = max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %error,
                    "Retrying after transient error"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
