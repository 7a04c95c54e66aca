//! Exponential-backoff retry around a single upstream call.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Default number of retries after the first attempt.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Retry policy configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before retry `n` is `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the retry following failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs a fallible async operation, retrying transient failures with backoff.
///
/// Errors are classified through [`MarketDataError::retry_class`]. Fatal errors
/// are returned immediately; retryable ones are retried up to
/// `policy.max_retries` times, after which
/// [`MarketDataError::RetriesExhausted`] is returned.
///
/// Every call this engine makes is a read, so repeating one is always safe.
#[derive(Clone, Debug, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, MarketDataError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Upstream call succeeded after {} retries", attempt);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    debug!("Fatal upstream error, not retrying: {}", e);
                    return Err(e);
                }
                Err(e) if attempt >= self.policy.max_retries => {
                    warn!(
                        "Upstream call failed after {} attempts, giving up: {}",
                        attempt + 1,
                        e
                    );
                    return Err(MarketDataError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "Retryable upstream error (attempt {}/{}), backing off {:?}: {}",
                        attempt + 1,
                        self.policy.max_retries + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
