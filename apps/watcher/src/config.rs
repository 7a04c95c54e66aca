//! Runner settings read from `CHARTSYNC_*` environment variables.

use std::time::Duration;

use anyhow::{anyhow, Context};
use chartsync_core::EngineConfig;
use chartsync_market_data::provider::polygon::DEFAULT_BASE_URL;

const DEFAULT_DB_PATH: &str = "./data/chartsync.db";
const DEFAULT_CHARTS: &str = "AAPL_1m";
const DEFAULT_MAX_PER_MINUTE: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub db_path: String,
    /// Row ceiling of the persisted chart table; `None` leaves it unbounded.
    pub cache_capacity: Option<usize>,
    pub charts: Vec<String>,
    /// `text` or `json`.
    pub log_format: String,
    pub max_per_minute: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key =
            var("CHARTSYNC_API_KEY").ok_or_else(|| anyhow!("CHARTSYNC_API_KEY must be set"))?;

        let cache_capacity = var("CHARTSYNC_CACHE_CAPACITY")
            .map(|raw| {
                raw.parse::<usize>()
                    .with_context(|| format!("CHARTSYNC_CACHE_CAPACITY is not a number: {}", raw))
            })
            .transpose()?;

        let max_per_minute = match var("CHARTSYNC_MAX_PER_MINUTE") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("CHARTSYNC_MAX_PER_MINUTE is not a number: {}", raw))?,
            None => DEFAULT_MAX_PER_MINUTE,
        };
        if max_per_minute == 0 {
            return Err(anyhow!("CHARTSYNC_MAX_PER_MINUTE must be at least 1"));
        }

        let charts = var("CHARTSYNC_CHARTS")
            .unwrap_or_else(|| DEFAULT_CHARTS.to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(Self {
            api_key,
            base_url: var("CHARTSYNC_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            db_path: var("CHARTSYNC_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            cache_capacity,
            charts,
            log_format: var("CHARTSYNC_LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
            max_per_minute,
        })
    }

    /// Engine defaults with the configured upstream quota.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.rate_limit.max_per_window = self.max_per_minute;
        config.rate_limit.window = Duration::from_secs(60);
        config
    }
}
