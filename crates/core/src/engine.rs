//! The engine facade.
//!
//! Wires the request queue, batch aggregator, cache tiers, chart emitter and
//! subscription scheduler together. Presentation code talks only to
//! [`Engine`]; it never reaches the queue or the caches directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use tokio::time::Instant;

use chartsync_market_data::{
    AggregatesProvider, RateLimiter, RequestQueue, RetryExecutor, Timeframe,
};

use crate::batch::{BatchAggregator, FetchedSeries, SeriesFetcher};
use crate::cache::{PersistentStore, TieredCache};
use crate::charts::{ChartPayload, ChartSpec};
use crate::config::EngineConfig;
use crate::constants::WILDCARD_CHART_ID;
use crate::errors::{Error, Result};
use crate::events::{ChartEmitter, ChartListener, ListenerHandle};
use crate::scheduler::{ChartLoader, Subscription, SubscriptionScheduler, SubscriptionState};

/// Market-data synchronization engine.
///
/// Must be created inside a Tokio runtime: construction starts the request
/// queue's dispatch loop.
pub struct Engine {
    rate_limiter: Arc<RateLimiter>,
    queue: Arc<RequestQueue>,
    cache: Arc<TieredCache>,
    batcher: Arc<BatchAggregator>,
    loader: Arc<ChartLoader>,
    emitter: Arc<ChartEmitter>,
    scheduler: Arc<SubscriptionScheduler>,
    closed: AtomicBool,
}

impl Engine {
    /// Build an engine over `provider`, persisting charts in `store`.
    ///
    /// Charts already in the store are loaded so subscribers see them before
    /// the first refresh completes.
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn AggregatesProvider>,
        store: Arc<dyn PersistentStore>,
    ) -> Result<Self> {
        let rate_limiter = Arc::new(RateLimiter::with_config(config.rate_limit.clone()));
        let queue = RequestQueue::new(
            Arc::clone(&rate_limiter),
            RetryExecutor::new(config.retry.clone()),
            config.queue.clone(),
        );
        let cache = Arc::new(TieredCache::new(&config.cache, store));
        let fetcher = Arc::new(SeriesFetcher::new(provider, Arc::clone(&queue)));
        let batcher = BatchAggregator::new(
            Arc::clone(&fetcher),
            Arc::clone(&cache),
            config.batch.clone(),
        );
        let loader = Arc::new(ChartLoader::new(
            Arc::clone(&batcher),
            fetcher,
            Arc::clone(&cache),
            config.batch.max_batch_size,
        ));
        let emitter = ChartEmitter::new(Arc::clone(&cache));
        let scheduler = SubscriptionScheduler::new(Arc::clone(&loader), Arc::clone(&emitter));

        let warmed = emitter.warm_from_cache()?;
        queue.start();
        info!(
            "Engine started ({} persisted charts, {} requests per {:?})",
            warmed, config.rate_limit.max_per_window, config.rate_limit.window
        );

        Ok(Self {
            rate_limiter,
            queue,
            cache,
            batcher,
            loader,
            emitter,
            scheduler,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::EngineClosed)
        } else {
            Ok(())
        }
    }

    /// One symbol's series over `timeframe` (unrecognized strings mean 30 days).
    ///
    /// Served from the memory tier when fresh, otherwise batched with other
    /// requests for the same timeframe.
    pub async fn request_series(&self, symbol: &str, timeframe: &str) -> Result<FetchedSeries> {
        self.ensure_open()?;
        let timeframe = Timeframe::parse_or_default(timeframe);
        self.loader.load_series(symbol, timeframe, true).await
    }

    /// Aligned comparison of `symbols` over `timeframe`.
    pub async fn fetch_comparison<S: AsRef<str>>(
        &self,
        symbols: &[S],
        timeframe: &str,
    ) -> Result<ChartPayload> {
        self.ensure_open()?;
        let spec = ChartSpec::new(symbols, Timeframe::parse_or_default(timeframe))?;
        self.loader
            .load_comparison(spec.symbols(), spec.timeframe(), true)
            .await
    }

    /// Listen to `chart_id` (or `"*"` for every chart).
    ///
    /// Cached data replays before this returns. A chart id of the form
    /// `SYMBOL_TF` or `SYM1,SYM2_TF` that is not yet refreshing is scheduled;
    /// other ids only receive payloads published through
    /// [`update_chart`](Self::update_chart).
    ///
    /// Subscribing to a chart that is already refreshing leaves its timer
    /// alone. Use [`watch_chart`](Self::watch_chart) to cancel the pending
    /// refresh and fetch immediately.
    pub fn subscribe<L>(&self, chart_id: &str, listener: L) -> Result<ListenerHandle>
    where
        L: ChartListener + 'static,
    {
        self.ensure_open()?;
        let spec = if chart_id == WILDCARD_CHART_ID {
            None
        } else {
            ChartSpec::parse_chart_id(chart_id).ok()
        };
        if spec.is_some() {
            self.emitter.revive(chart_id);
        }

        let handle = self.emitter.subscribe(chart_id, Arc::new(listener));

        if let Some(spec) = spec {
            if !self.scheduler.is_subscribed(chart_id) {
                self.scheduler.subscribe(chart_id, spec);
            }
        } else {
            debug!("Listening to unscheduled chart id {}", chart_id);
        }
        Ok(handle)
    }

    /// Start (or restart) refreshing a chart. Returns its chart id.
    ///
    /// Restarting cancels the pending refresh and fetches immediately.
    pub fn watch_chart(&self, spec: ChartSpec) -> Result<String> {
        self.ensure_open()?;
        let chart_id = spec.chart_id();
        self.emitter.revive(&chart_id);
        if !self.scheduler.subscribe(&chart_id, spec) {
            return Err(Error::EngineClosed);
        }
        Ok(chart_id)
    }

    /// Stop refreshing a chart. Its last payload and listeners stay.
    pub fn unsubscribe_chart(&self, chart_id: &str) -> bool {
        self.scheduler.unsubscribe(chart_id)
    }

    /// Publish a payload under `chart_id` and persist it.
    pub fn update_chart(&self, chart_id: &str, payload: ChartPayload) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.emitter.update_chart(chart_id, payload))
    }

    /// Stop refreshing, forget and un-persist a chart. Wildcard listeners are told.
    pub fn remove_chart(&self, chart_id: &str) {
        self.scheduler.unsubscribe(chart_id);
        self.emitter.remove_chart(chart_id);
    }

    pub fn get_chart(&self, chart_id: &str) -> Option<Arc<ChartPayload>> {
        self.emitter.get_chart(chart_id)
    }

    pub fn get_all_charts(&self) -> HashMap<String, Arc<ChartPayload>> {
        self.emitter.get_all_charts()
    }

    pub fn subscription_state(&self, chart_id: &str) -> SubscriptionState {
        self.scheduler.state(chart_id)
    }

    pub fn next_fire_at(&self, chart_id: &str) -> Option<Instant> {
        self.scheduler.next_fire_at(chart_id)
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.scheduler.subscriptions()
    }

    /// Upstream tasks waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Upstream calls still allowed in the current rate-limit window.
    pub fn remaining_quota(&self) -> u32 {
        self.rate_limiter.remaining()
    }

    /// Empty both cache tiers. Charts already published stay in memory.
    pub fn clear_cache(&self) -> Result<()> {
        Ok(self.cache.clear()?)
    }

    /// Cancel every timer, fail pending requests and stop the queue.
    ///
    /// Idempotent. Published charts stay readable.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.scheduler.close();
        self.batcher.close();
        self.queue.close();
        self.emitter.clear_listeners();
        info!("Engine closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close();
    }
}
