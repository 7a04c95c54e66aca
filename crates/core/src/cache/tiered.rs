use std::sync::Arc;

use chartsync_market_data::TimeSeriesPoint;

use super::memory::MemoryCache;
use super::persisted::PersistedCache;
use super::store::PersistentStore;
use super::{CacheEntry, SeriesKey};
use crate::charts::ChartPayload;
use crate::config::CacheConfig;
use crate::errors::CacheError;

/// Both cache tiers behind one handle.
///
/// Series fetched from the provider live in the memory tier; published chart
/// payloads are written through to the persisted tier so they survive a
/// restart.
pub struct TieredCache {
    series: MemoryCache<SeriesKey, Vec<TimeSeriesPoint>>,
    charts: PersistedCache,
}

impl TieredCache {
    pub fn new(config: &CacheConfig, store: Arc<dyn PersistentStore>) -> Self {
        Self {
            series: MemoryCache::new(config.memory_ttl),
            charts: PersistedCache::new(store, config.eviction_fraction),
        }
    }

    pub fn memory(&self) -> &MemoryCache<SeriesKey, Vec<TimeSeriesPoint>> {
        &self.series
    }

    pub fn persisted(&self) -> &PersistedCache {
        &self.charts
    }

    pub fn get_series(&self, key: &SeriesKey) -> Option<CacheEntry<Vec<TimeSeriesPoint>>> {
        self.series.get(key)
    }

    pub fn set_series(&self, key: SeriesKey, points: Vec<TimeSeriesPoint>) {
        self.series.set(key, points);
    }

    pub fn get_chart(&self, chart_id: &str) -> Result<Option<CacheEntry<ChartPayload>>, CacheError> {
        self.charts.get(chart_id)
    }

    pub fn set_chart(&self, chart_id: &str, payload: &ChartPayload) -> Result<(), CacheError> {
        self.charts.set(chart_id, payload)
    }

    pub fn remove_chart(&self, chart_id: &str) -> Result<(), CacheError> {
        self.charts.remove(chart_id)
    }

    pub fn persisted_charts(&self) -> Result<Vec<CacheEntry<ChartPayload>>, CacheError> {
        self.charts.entries()
    }

    /// Empty both tiers.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.series.clear();
        self.charts.clear()
    }
}
