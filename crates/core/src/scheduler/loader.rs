//! Builds chart payloads from cached or freshly fetched series.

use std::sync::Arc;

use futures::future::join_all;
use log::{debug, warn};

use chartsync_market_data::{DataSource, TimeSeriesPoint, Timeframe, PRIORITY_ELEVATED};

use crate::batch::{BatchAggregator, FetchedSeries, SeriesFetcher};
use crate::cache::{SeriesKey, TieredCache};
use crate::charts::{ChartPayload, ChartSpec};
use crate::errors::Result;

/// Produces [`ChartPayload`]s for chart specs.
///
/// Single-symbol charts go through the [`BatchAggregator`]; comparisons issue
/// their own grouped fetch so all their series come from the same moment.
pub struct ChartLoader {
    batcher: Arc<BatchAggregator>,
    fetcher: Arc<SeriesFetcher>,
    cache: Arc<TieredCache>,
    max_batch_size: usize,
}

impl ChartLoader {
    pub fn new(
        batcher: Arc<BatchAggregator>,
        fetcher: Arc<SeriesFetcher>,
        cache: Arc<TieredCache>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            batcher,
            fetcher,
            cache,
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Build the payload for a chart spec.
    ///
    /// With `use_cache`, fresh series in the memory tier are used instead of
    /// asking upstream. Scheduled refreshes pass `false`.
    pub async fn load(&self, spec: &ChartSpec, use_cache: bool) -> Result<ChartPayload> {
        if spec.is_comparison() {
            self.load_comparison(spec.symbols(), spec.timeframe(), use_cache)
                .await
        } else {
            let symbol = spec.symbols().first().map(String::as_str).unwrap_or_default();
            let series = self.load_series(symbol, spec.timeframe(), use_cache).await?;
            Ok(ChartPayload::single(
                &series.symbol,
                series.timeframe,
                series.points,
                series.source,
            ))
        }
    }

    /// One symbol's series, from the memory tier when allowed, else batched.
    pub async fn load_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        use_cache: bool,
    ) -> Result<FetchedSeries> {
        if use_cache {
            if let Some(entry) = self.cache.get_series(&SeriesKey::single(symbol, timeframe)) {
                debug!("Memory cache hit for {} over {}", symbol, timeframe);
                return Ok(FetchedSeries::real(
                    symbol,
                    timeframe,
                    entry.payload.as_ref().clone(),
                ));
            }
        }
        self.batcher.request(symbol, timeframe).await
    }

    /// Comparison payload for `symbols`, aligned on the union of their dates.
    ///
    /// A failed grouped fetch is returned as an error so the caller keeps its
    /// last good payload. A symbol missing from an otherwise good response is
    /// plotted from a synthetic series and marks the payload synthetic.
    pub async fn load_comparison(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        use_cache: bool,
    ) -> Result<ChartPayload> {
        let mut series: Vec<Option<(Vec<TimeSeriesPoint>, DataSource)>> =
            vec![None; symbols.len()];
        let mut misses: Vec<String> = Vec::new();

        for (slot, symbol) in series.iter_mut().zip(symbols) {
            let cached = if use_cache {
                self.cache.get_series(&SeriesKey::single(symbol, timeframe))
            } else {
                None
            };
            match cached {
                Some(entry) => *slot = Some((entry.payload.as_ref().clone(), DataSource::Real)),
                None => misses.push(symbol.clone()),
            }
        }

        if !misses.is_empty() {
            let grouped = join_all(
                misses
                    .chunks(self.max_batch_size)
                    .map(|chunk| self.fetcher.fetch_group(chunk, timeframe, PRIORITY_ELEVATED)),
            )
            .await;

            for outcome in grouped {
                for (symbol, fetched) in outcome? {
                    let resolved = match fetched {
                        Ok(points) => {
                            self.cache
                                .set_series(SeriesKey::single(&symbol, timeframe), points.clone());
                            (points, DataSource::Real)
                        }
                        Err(e) => {
                            warn!(
                                "Comparison series for {} unavailable, using synthetic: {}",
                                symbol, e
                            );
                            let synthetic = FetchedSeries::synthetic(&symbol, timeframe);
                            (synthetic.points, synthetic.source)
                        }
                    };
                    if let Some(index) = symbols.iter().position(|s| *s == symbol) {
                        series[index] = Some(resolved);
                    }
                }
            }
        }

        let mut named: Vec<(String, Vec<TimeSeriesPoint>)> = Vec::with_capacity(symbols.len());
        let mut sources: Vec<DataSource> = Vec::with_capacity(symbols.len());
        for (symbol, slot) in symbols.iter().zip(series) {
            let (points, source) = slot.unwrap_or_else(|| (Vec::new(), DataSource::Real));
            named.push((symbol.clone(), points));
            sources.push(source);
        }

        Ok(ChartPayload::comparison(
            timeframe,
            &named,
            DataSource::combine(sources),
        ))
    }
}
