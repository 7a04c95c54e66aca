//! Upstream dispatch module.
//!
//! Everything that reaches the provider goes through here:
//! - Rolling-window rate limiting shared by all callers
//! - Exponential-backoff retry of transient failures
//! - A priority request queue with minimum inter-request spacing

mod rate_limiter;
mod request_queue;
mod retry;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use request_queue::{
    QueueConfig, QueueHandle, RequestQueue, PRIORITY_ELEVATED, PRIORITY_NORMAL,
};
pub use retry::{RetryExecutor, RetryPolicy};
