//! Debounced batching of per-symbol series requests.
//!
//! Requests for the same timeframe arriving within the debounce window are
//! coalesced into grouped upstream calls of at most `max_batch_size` symbols.
//! A failed group falls back to one request per symbol, and a symbol that still
//! cannot be fetched is served a deterministic synthetic series.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use chartsync_market_data::{
    DataSource, MarketDataError, TimeSeriesPoint, Timeframe, PRIORITY_ELEVATED, PRIORITY_NORMAL,
};

use super::fetcher::SeriesFetcher;
use crate::cache::{SeriesKey, TieredCache};
use crate::charts::synthetic_series;
use crate::config::BatchConfig;
use crate::errors::{Error, Result};

/// A series delivered to batch callers.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub points: Vec<TimeSeriesPoint>,
    pub source: DataSource,
}

impl FetchedSeries {
    pub fn real(symbol: &str, timeframe: Timeframe, points: Vec<TimeSeriesPoint>) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            points,
            source: DataSource::Real,
        }
    }

    pub fn synthetic(symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            points: synthetic_series(symbol, timeframe, Utc::now().date_naive()),
            source: DataSource::Synthetic,
        }
    }
}

/// Callback invoked once with the series for the requested symbol.
pub type BatchCallback = Box<dyn FnOnce(FetchedSeries) + Send>;

struct PendingBatch {
    id: u64,
    /// Distinct symbols in arrival order.
    symbols: Vec<String>,
    callbacks: HashMap<String, Vec<BatchCallback>>,
    timer: Option<JoinHandle<()>>,
}

impl PendingBatch {
    fn new(id: u64) -> Self {
        Self {
            id,
            symbols: Vec::new(),
            callbacks: HashMap::new(),
            timer: None,
        }
    }
}

#[derive(Default)]
struct AggregatorState {
    /// One pending group per timeframe.
    pending: HashMap<Timeframe, PendingBatch>,
    next_batch_id: u64,
    closed: bool,
}

/// Coalesces series requests into grouped upstream calls.
pub struct BatchAggregator {
    state: Mutex<AggregatorState>,
    fetcher: Arc<SeriesFetcher>,
    cache: Arc<TieredCache>,
    config: BatchConfig,
}

impl BatchAggregator {
    pub fn new(fetcher: Arc<SeriesFetcher>, cache: Arc<TieredCache>, config: BatchConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(AggregatorState::default()),
            fetcher,
            cache,
            config,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Batch aggregator mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Add `symbol` to the pending group for `timeframe`.
    ///
    /// Each call restarts the group's debounce timer; a group reaching
    /// `max_batch_size` symbols is flushed immediately. Every callback
    /// registered for a symbol is invoked exactly once with its series.
    /// After [`close`](Self::close) the callback is dropped uncalled.
    pub fn add_to_batch(self: &Arc<Self>, symbol: &str, timeframe: Timeframe, callback: BatchCallback) {
        let symbol = symbol.trim().to_uppercase();
        let mut guard = self.lock_state();
        let state = &mut *guard;
        if state.closed {
            debug!("Batch aggregator closed, dropping request for {}", symbol);
            return;
        }

        let next_id = state.next_batch_id;
        let batch = state.pending.entry(timeframe).or_insert_with(|| {
            state.next_batch_id += 1;
            PendingBatch::new(next_id)
        });

        if !batch.symbols.contains(&symbol) {
            batch.symbols.push(symbol.clone());
        }
        batch.callbacks.entry(symbol).or_default().push(callback);
        if let Some(timer) = batch.timer.take() {
            timer.abort();
        }

        if batch.symbols.len() >= self.config.max_batch_size {
            if let Some(full) = state.pending.remove(&timeframe) {
                drop(guard);
                debug!(
                    "Batch for {} reached {} symbols, flushing now",
                    timeframe,
                    full.symbols.len()
                );
                self.spawn_flush(timeframe, full);
            }
            return;
        }

        let aggregator = Arc::clone(self);
        let batch_id = batch.id;
        let debounce = self.config.debounce;
        batch.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            aggregator.flush_if_current(timeframe, batch_id);
        }));
    }

    /// Convenience wrapper around [`add_to_batch`](Self::add_to_batch).
    pub async fn request(self: &Arc<Self>, symbol: &str, timeframe: Timeframe) -> Result<FetchedSeries> {
        let (tx, rx) = oneshot::channel();
        self.add_to_batch(
            symbol,
            timeframe,
            Box::new(move |series| {
                // The requester may have gone away
                let _ = tx.send(series);
            }),
        );
        rx.await.map_err(|_| Error::EngineClosed)
    }

    /// Flush the pending group for `timeframe` if it is still batch `batch_id`.
    fn flush_if_current(self: &Arc<Self>, timeframe: Timeframe, batch_id: u64) {
        let batch = {
            let mut state = self.lock_state();
            match state.pending.get(&timeframe) {
                Some(batch) if batch.id == batch_id => state.pending.remove(&timeframe),
                _ => None,
            }
        };
        if let Some(batch) = batch {
            self.spawn_flush(timeframe, batch);
        }
    }

    /// Run the flush on its own task so aborting a debounce timer can never
    /// cancel a flush that already started.
    fn spawn_flush(self: &Arc<Self>, timeframe: Timeframe, batch: PendingBatch) {
        let aggregator = Arc::clone(self);
        tokio::spawn(async move { aggregator.flush(timeframe, batch).await });
    }

    async fn flush(&self, timeframe: Timeframe, batch: PendingBatch) {
        let PendingBatch {
            symbols,
            mut callbacks,
            ..
        } = batch;
        let chunks: Vec<Vec<String>> = symbols
            .chunks(self.config.max_batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        info!(
            "Flushing batch of {} symbols over {} in {} grouped calls",
            symbols.len(),
            timeframe,
            chunks.len()
        );

        let grouped = join_all(
            chunks
                .iter()
                .map(|chunk| self.fetcher.fetch_group(chunk, timeframe, PRIORITY_ELEVATED)),
        )
        .await;

        let mut delivered: Vec<FetchedSeries> = Vec::with_capacity(symbols.len());
        let mut fallback: Vec<String> = Vec::new();
        for (chunk, outcome) in chunks.into_iter().zip(grouped) {
            match outcome {
                Ok(per_symbol) => {
                    for (symbol, series) in per_symbol {
                        delivered.push(self.resolve(&symbol, timeframe, series));
                    }
                }
                Err(e) => {
                    warn!(
                        "Grouped fetch of {:?} failed, falling back to individual requests: {}",
                        chunk, e
                    );
                    fallback.extend(chunk);
                }
            }
        }

        if !fallback.is_empty() {
            let individual = join_all(
                fallback
                    .iter()
                    .map(|symbol| self.fetcher.fetch_single(symbol, timeframe, PRIORITY_NORMAL)),
            )
            .await;
            for (symbol, series) in fallback.iter().zip(individual) {
                delivered.push(self.resolve(symbol, timeframe, series));
            }
        }

        for series in delivered {
            if !series.source.is_synthetic() {
                self.cache.set_series(
                    SeriesKey::single(&series.symbol, timeframe),
                    series.points.clone(),
                );
            }
            for callback in callbacks.remove(&series.symbol).into_iter().flatten() {
                callback(series.clone());
            }
        }
    }

    fn resolve(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        series: std::result::Result<Vec<TimeSeriesPoint>, MarketDataError>,
    ) -> FetchedSeries {
        match series {
            Ok(points) => FetchedSeries::real(symbol, timeframe, points),
            Err(e) => {
                warn!("Serving synthetic series for {} over {}: {}", symbol, timeframe, e);
                FetchedSeries::synthetic(symbol, timeframe)
            }
        }
    }

    /// Number of distinct symbols waiting across all pending groups.
    pub fn pending_len(&self) -> usize {
        self.lock_state()
            .pending
            .values()
            .map(|batch| batch.symbols.len())
            .sum()
    }

    /// Cancel every debounce timer and drop pending requests.
    pub fn close(&self) {
        let mut state = self.lock_state();
        state.closed = true;
        let dropped: usize = state
            .pending
            .drain()
            .map(|(_, batch)| {
                if let Some(timer) = batch.timer {
                    timer.abort();
                }
                batch.symbols.len()
            })
            .sum();
        if dropped > 0 {
            info!("Batch aggregator closed, dropped {} pending symbols", dropped);
        }
    }
}
