/// Classification for retry policy.
///
/// Used by the [`RetryExecutor`](crate::dispatch::RetryExecutor) to decide
/// whether a failed upstream call is worth another attempt.
///
/// # Behavior Summary
///
/// | Class | Retried? | Backoff |
/// |-------|----------|---------|
/// | `WithBackoff` | Yes, up to the retry cap | `base_delay * 2^attempt` |
/// | `Never` | No | - |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - malformed data, bad request, or terminal failure.
    /// The request is fundamentally invalid and retrying won't help.
    Never,

    /// Retry after an exponentially growing delay.
    ///
    /// Used for transient errors like rate limiting (429), timeouts and
    /// network-layer failures.
    WithBackoff,
}

impl RetryClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, RetryClass::WithBackoff)
    }
}
