use std::sync::Arc;

use chartsync_core::cache::PersistentStore;
use chartsync_core::{ChartEvent, Engine};
use chartsync_market_data::{AggregatesProvider, PolygonProvider};
use chartsync_storage_sqlite::SqliteCacheStore;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Engine over the HTTP provider with charts persisted in SQLite.
pub fn build_engine(config: &Config) -> anyhow::Result<Engine> {
    let store: Arc<dyn PersistentStore> =
        Arc::new(SqliteCacheStore::open(&config.db_path, config.cache_capacity)?);
    tracing::info!("Chart cache database in use: {}", config.db_path);

    let provider: Arc<dyn AggregatesProvider> = Arc::new(PolygonProvider::with_base_url(
        config.api_key.clone(),
        config.base_url.clone(),
    ));

    Ok(Engine::new(config.engine_config(), provider, store)?)
}

pub fn log_event(event: &ChartEvent) {
    match event {
        ChartEvent::Updated { id, payload } => tracing::info!(
            chart = %id,
            source = ?payload.source,
            points = payload.result.len(),
            updated_at = %payload.updated_at,
            "Chart updated"
        ),
        ChartEvent::Removed { id } => tracing::info!(chart = %id, "Chart removed"),
    }
}
