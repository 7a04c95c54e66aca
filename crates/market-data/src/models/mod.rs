//! Market data models
//!
//! This module contains the core data types for upstream time-series access:
//! - `timeframe` - Lookback strings such as `1m` and their request/refresh mapping
//! - `aggregate` - Raw upstream bars and the aggregates request/response envelope
//! - `series` - Normalized `TimeSeriesPoint` series and their `DataSource` tag

mod aggregate;
mod series;
mod timeframe;

pub use aggregate::{Aggregate, AggregatesRequest, AggregatesResponse, Timespan};
pub use series::{normalize_aggregates, DataSource, TimeSeriesPoint};
pub use timeframe::{Timeframe, TimeframeUnit, DEFAULT_TIMEFRAME_DAYS, MAX_TIMEFRAME_DAYS};
