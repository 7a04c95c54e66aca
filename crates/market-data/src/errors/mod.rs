//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all upstream operations
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Errors that can occur while talking to the upstream provider.
///
/// Each variant is classified into a [`RetryClass`] via the [`retry_class`](Self::retry_class)
/// method, which determines whether the retry executor backs off and tries again.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The provider rate limited the request (HTTP 429).
    /// Should retry with exponential backoff.
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// A network-layer failure (connection refused, reset, DNS).
    /// Should retry with exponential backoff.
    #[error("Network error: {provider} - {message}")]
    Network {
        /// The provider being contacted
        provider: String,
        /// The transport error message
        message: String,
    },

    /// The request to the provider timed out.
    /// Should retry with exponential backoff.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// A provider-specific error occurred (non-2xx status, API error payload).
    /// Terminal unless the message reports a rate limit.
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The provider answered but the payload was malformed or had no results.
    /// Terminal; the batching layer substitutes synthetic data.
    #[error("Upstream data error for {symbol}: {message}")]
    UpstreamData {
        /// Symbol the response was for
        symbol: String,
        /// Description of what was wrong with the payload
        message: String,
    },

    /// The timeframe string could not be turned into a request.
    #[error("Invalid timeframe: {0}")]
    InvalidTimeframe(String),

    /// A retryable error persisted past the retry cap.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Total number of attempts made, including the first one
        attempts: u32,
        /// The error returned by the final attempt
        last: Box<MarketDataError>,
    },

    /// The request queue was shut down before the task completed.
    #[error("Request queue closed")]
    QueueClosed,

    /// A transport error surfaced directly from the HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use chartsync_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::RateLimited { provider: "POLYGON".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = MarketDataError::UpstreamData {
    ///     symbol: "AAPL".to_string(),
    ///     message: "empty results".to_string(),
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Transient errors - retry with backoff
            Self::RateLimited { .. } | Self::Network { .. } | Self::Timeout { .. } => {
                RetryClass::WithBackoff
            }

            // Some providers report throttling in a 4xx/5xx body instead of a 429
            Self::ProviderError { message, .. } if mentions_rate_limit(message) => {
                RetryClass::WithBackoff
            }

            Self::Http(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                RetryClass::WithBackoff
            }

            Self::ProviderError { .. }
            | Self::UpstreamData { .. }
            | Self::InvalidTimeframe(_)
            | Self::RetriesExhausted { .. }
            | Self::QueueClosed
            | Self::Http(_) => RetryClass::Never,
        }
    }

    /// Shorthand for `retry_class().is_retryable()`.
    pub fn is_retryable(&self) -> bool {
        self.retry_class().is_retryable()
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower.contains("maximum requests per")
}
