//! Chartsync Market Data Crate
//!
//! This crate is the only layer of chartsync that talks to the upstream
//! time-series provider. It shields the rest of the engine from the provider's
//! quota and failure modes.
//!
//! # Overview
//!
//! The market data crate supports:
//! - Timeframe strings (`1m`, `3m`, `1y`) and their mapping to upstream requests
//! - Normalization of raw OHLCV bars into ascending, date-unique series
//! - A Polygon-style aggregates provider over HTTP
//! - Global rate limiting, exponential-backoff retry and a priority request queue
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |  Engine (core)   |  batches, caches, charts
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! |  RequestQueue    | --> |   RateLimiter    |  (rolling window, global)
//! +------------------+     +------------------+
//!          |
//!          v
//! +------------------+
//! |  RetryExecutor   |  (exponential backoff on 429/network)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! |    Provider      |  (Polygon, test doubles, ...)
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Timeframe`] - Count + unit lookback such as `1m`
//! - [`TimeSeriesPoint`] - Normalized `{date, value, ...}` point
//! - [`DataSource`] - Real vs synthetic tag carried by every series
//! - [`AggregatesProvider`] - Upstream provider trait
//! - [`RequestQueue`] - The single gateway to the provider

pub mod dispatch;
pub mod errors;
pub mod models;
pub mod provider;

// Re-export all public types from models
pub use models::{
    normalize_aggregates, Aggregate, AggregatesRequest, AggregatesResponse, DataSource,
    TimeSeriesPoint, Timeframe, TimeframeUnit, Timespan,
};

// Re-export provider types
pub use provider::polygon::PolygonProvider;
pub use provider::AggregatesProvider;

// Re-export dispatch types
pub use dispatch::{
    QueueConfig, QueueHandle, RateLimiter, RateLimiterConfig, RequestQueue, RetryExecutor,
    RetryPolicy, PRIORITY_ELEVATED, PRIORITY_NORMAL,
};

pub use errors::{MarketDataError, RetryClass};
