//! Queue-backed series fetching.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use log::debug;

use chartsync_market_data::{
    normalize_aggregates, AggregatesProvider, AggregatesRequest, MarketDataError, RequestQueue,
    TimeSeriesPoint, Timeframe,
};

/// Per-symbol outcome of a grouped fetch.
pub type GroupedSeries = HashMap<String, Result<Vec<TimeSeriesPoint>, MarketDataError>>;

/// Turns symbols and timeframes into queued upstream calls and normalized series.
///
/// Every call goes through the shared [`RequestQueue`], so rate limiting, spacing
/// and retries apply uniformly.
pub struct SeriesFetcher {
    provider: Arc<dyn AggregatesProvider>,
    queue: Arc<RequestQueue>,
}

impl SeriesFetcher {
    pub fn new(provider: Arc<dyn AggregatesProvider>, queue: Arc<RequestQueue>) -> Self {
        Self { provider, queue }
    }

    /// Fetch several symbols as one grouped operation.
    ///
    /// With a provider that has a native grouped endpoint this is one queued
    /// task. Otherwise every symbol is its own queued task, so each real
    /// upstream request passes the rate limiter.
    ///
    /// The outer error means the group as a whole failed. A symbol whose slice
    /// of the response is missing or empty fails individually inside the map.
    pub async fn fetch_group(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        priority: i32,
    ) -> Result<GroupedSeries, MarketDataError> {
        if !self.provider.supports_grouped() {
            return self.fetch_each(symbols, timeframe, priority).await;
        }

        let today = Utc::now().date_naive();
        let requests: Vec<AggregatesRequest> = symbols
            .iter()
            .map(|symbol| timeframe.to_request(symbol, today))
            .collect();
        debug!(
            "Queueing grouped fetch of {} symbols over {} ({})",
            symbols.len(),
            timeframe,
            self.provider.id()
        );

        let provider = Arc::clone(&self.provider);
        let mut responses = self
            .queue
            .enqueue(priority, move || {
                let provider = Arc::clone(&provider);
                let requests = requests.clone();
                async move { provider.fetch_grouped(&requests).await }
            })
            .await?;

        Ok(symbols
            .iter()
            .map(|symbol| {
                let series = match responses.remove(symbol) {
                    Some(response) => normalize_aggregates(symbol, response.results),
                    None => Err(MarketDataError::UpstreamData {
                        symbol: symbol.clone(),
                        message: "missing from grouped response".to_string(),
                    }),
                };
                (symbol.clone(), series)
            })
            .collect())
    }

    async fn fetch_each(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        priority: i32,
    ) -> Result<GroupedSeries, MarketDataError> {
        debug!(
            "Queueing {} per-symbol fetches over {} ({} has no grouped endpoint)",
            symbols.len(),
            timeframe,
            self.provider.id()
        );
        let outcomes = join_all(
            symbols
                .iter()
                .map(|symbol| self.fetch_single(symbol, timeframe, priority)),
        )
        .await;

        let mut grouped = GroupedSeries::with_capacity(symbols.len());
        for (symbol, outcome) in symbols.iter().zip(outcomes) {
            if let Err(MarketDataError::QueueClosed) = outcome {
                return Err(MarketDataError::QueueClosed);
            }
            grouped.insert(symbol.clone(), outcome);
        }
        Ok(grouped)
    }

    /// Fetch one symbol as its own queued task.
    pub async fn fetch_single(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        priority: i32,
    ) -> Result<Vec<TimeSeriesPoint>, MarketDataError> {
        let request = timeframe.to_request(symbol, Utc::now().date_naive());
        let provider = Arc::clone(&self.provider);
        let response = self
            .queue
            .enqueue(priority, move || {
                let provider = Arc::clone(&provider);
                let request = request.clone();
                async move { provider.fetch_aggregates(&request).await }
            })
            .await?;
        normalize_aggregates(symbol, response.results)
    }
}
