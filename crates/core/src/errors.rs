//! Core error types for the chartsync engine.
//!
//! Storage back ends convert their own failures into [`CacheError`] so this
//! crate stays independent of any particular database.

use thiserror::Error;

use chartsync_market_data::MarketDataError;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Market data operation failed: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Cache operation failed: {0}")]
    Cache(#[from] CacheError),

    #[error("Chart '{0}' has been removed")]
    ChartRemoved(String),

    #[error("Invalid chart id: {0}")]
    InvalidChartId(String),

    #[error("Engine is closed")]
    EngineClosed,
}

/// Errors raised by the cache tiers and the persistent stores behind them.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The persistent store is full. The persisted tier evicts and retries once.
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, CacheError::QuotaExceeded(_))
    }
}
