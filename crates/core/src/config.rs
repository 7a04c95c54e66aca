//! Engine configuration.
//!
//! Every knob has a default matching a free-tier aggregates plan, so
//! `EngineConfig::default()` is a working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use chartsync_market_data::{QueueConfig, RateLimiterConfig, RetryPolicy};

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);
const DEFAULT_MAX_BATCH_SIZE: usize = 5;
const DEFAULT_MEMORY_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_EVICTION_FRACTION: f64 = 0.25;

/// Batch aggregation settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Quiet period after the last request before a pending group is flushed.
    pub debounce: Duration,
    /// A group reaching this many symbols flushes immediately; also the
    /// chunk size of grouped upstream calls.
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// Cache tier settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of in-memory series entries.
    pub memory_ttl: Duration,
    /// Share of persisted entries evicted (oldest first) when the store is full.
    pub eviction_fraction: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_ttl: DEFAULT_MEMORY_TTL,
            eviction_fraction: DEFAULT_EVICTION_FRACTION,
        }
    }
}

/// Top-level engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rate_limit: RateLimiterConfig,
    pub retry: RetryPolicy,
    pub queue: QueueConfig,
    pub batch: BatchConfig,
    pub cache: CacheConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.rate_limit.max_per_window, 5);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.queue.min_spacing, Duration::from_secs(2));
        assert_eq!(config.batch.debounce, Duration::from_millis(200));
        assert_eq!(config.batch.max_batch_size, 5);
        assert_eq!(config.cache.memory_ttl, Duration::from_secs(1800));
        assert_eq!(config.cache.eviction_fraction, 0.25);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"batch": {"max_batch_size": 3}}"#).unwrap();
        assert_eq!(config.batch.max_batch_size, 3);
        assert_eq!(config.batch.debounce, DEFAULT_DEBOUNCE);
        assert_eq!(config.rate_limit, RateLimiterConfig::default());
    }
}
