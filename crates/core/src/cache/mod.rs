//! Two-tier cache.
//!
//! - [`MemoryCache`] - process-local, TTL-bounded series cache (tier 1)
//! - [`PersistedCache`] - chart payloads kept in a [`PersistentStore`] across
//!   restarts, with oldest-first eviction when the store is full (tier 2)
//! - [`TieredCache`] - both tiers behind one handle
//!
//! Entries are handed out as shared [`Arc`]s and never mutated once written.

mod memory;
mod persisted;
mod store;
mod tiered;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use chartsync_market_data::Timeframe;

pub use memory::MemoryCache;
pub use persisted::PersistedCache;
pub use store::{MemoryStore, PersistentStore};
pub use tiered::TieredCache;

/// A cached value with its key and write time.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub key: String,
    pub payload: Arc<T>,
    pub written_at: DateTime<Utc>,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            payload: Arc::clone(&self.payload),
            written_at: self.written_at,
        }
    }
}

/// Tier-1 key: the sorted symbol set plus the timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    symbols: Vec<String>,
    timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new<I, S>(symbols: I, timeframe: Timeframe) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut symbols: Vec<String> = symbols
            .into_iter()
            .map(|s| s.as_ref().trim().to_uppercase())
            .collect();
        symbols.sort();
        symbols.dedup();
        Self { symbols, timeframe }
    }

    pub fn single(symbol: &str, timeframe: Timeframe) -> Self {
        Self::new([symbol], timeframe)
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbols.join(","), self.timeframe)
    }
}
