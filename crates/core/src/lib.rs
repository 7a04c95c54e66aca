//! Chartsync Core - the market-data synchronization engine.
//!
//! Sits between a rate-limited time-series provider and the charts that
//! display its data. Requests are batched, deduplicated and cached; subscribed
//! charts are refreshed on a timeframe-dependent cadence and pushed to
//! listeners.
//!
//! # Architecture
//!
//! ```text
//! Engine ─┬─> SubscriptionScheduler ──> ChartLoader ─┬─> BatchAggregator ─┐
//!         │                                         └─> SeriesFetcher <──┘
//!         │                                                  │
//!         │                                           RequestQueue (market-data)
//!         └─> ChartEmitter ──> TieredCache (memory + persisted store)
//! ```
//!
//! Storage back ends implement [`cache::PersistentStore`]; the
//! `storage-sqlite` crate provides the SQLite one.

pub mod batch;
pub mod cache;
pub mod charts;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod events;
pub mod scheduler;

#[cfg(test)]
mod engine_tests;
#[cfg(test)]
pub(crate) mod test_utils;

pub use batch::FetchedSeries;
pub use cache::{MemoryStore, PersistentStore};
pub use charts::{ChartPayload, ChartResult, ChartSpec, MergedRow, SeriesMeta};
pub use config::EngineConfig;
pub use engine::Engine;
pub use events::{ChartEvent, ChartListener, ListenerHandle, RecordingListener};
pub use scheduler::SubscriptionState;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
