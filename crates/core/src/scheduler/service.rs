//! Per-chart refresh loops.
//!
//! Each subscribed chart owns one task that fetches, publishes to the
//! [`ChartEmitter`] and sleeps for its timeframe's refresh interval. Every
//! (re)subscription bumps a generation counter; a loop whose generation is no
//! longer current stops before publishing. A refresh that only yields
//! synthetic data never replaces a chart that already shows upstream data.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::loader::ChartLoader;
use super::subscription::{Subscription, SubscriptionState};
use crate::charts::ChartSpec;
use crate::events::ChartEmitter;

struct SubscriptionEntry {
    spec: ChartSpec,
    state: SubscriptionState,
    generation: u64,
    task: Option<JoinHandle<()>>,
    next_fire_at: Option<Instant>,
    refresh_count: u64,
    consecutive_failures: u32,
}

#[derive(Default)]
struct SchedulerState {
    entries: HashMap<String, SubscriptionEntry>,
    removed: HashSet<String>,
    next_generation: u64,
    closed: bool,
}

/// Keeps subscribed charts fresh.
pub struct SubscriptionScheduler {
    state: Mutex<SchedulerState>,
    loader: Arc<ChartLoader>,
    emitter: Arc<ChartEmitter>,
}

impl SubscriptionScheduler {
    pub fn new(loader: Arc<ChartLoader>, emitter: Arc<ChartEmitter>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SchedulerState::default()),
            loader,
            emitter,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Subscription scheduler mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Start (or restart) refreshing `chart_id`.
    ///
    /// Any pending refresh for the id is cancelled and an immediate fetch is
    /// started. Returns false once the scheduler is closed.
    pub fn subscribe(self: &Arc<Self>, chart_id: &str, spec: ChartSpec) -> bool {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        if state.closed {
            return false;
        }
        state.removed.remove(chart_id);

        let generation = state.next_generation;
        state.next_generation += 1;

        let entry = state
            .entries
            .entry(chart_id.to_string())
            .or_insert_with(|| SubscriptionEntry {
                spec: spec.clone(),
                state: SubscriptionState::Idle,
                generation,
                task: None,
                next_fire_at: None,
                refresh_count: 0,
                consecutive_failures: 0,
            });
        if let Some(task) = entry.task.take() {
            task.abort();
            debug!("Cancelled pending refresh of {}", chart_id);
        }
        entry.spec = spec;
        entry.generation = generation;
        entry.state = SubscriptionState::Fetching;
        entry.next_fire_at = None;

        let scheduler = Arc::clone(self);
        let id = chart_id.to_string();
        entry.task = Some(tokio::spawn(async move {
            scheduler.run(id, generation).await;
        }));
        info!("Subscribed chart {}", chart_id);
        true
    }

    /// Stop refreshing `chart_id`. Returns whether it was subscribed.
    pub fn unsubscribe(&self, chart_id: &str) -> bool {
        let mut state = self.lock_state();
        state.removed.insert(chart_id.to_string());
        match state.entries.remove(chart_id) {
            Some(entry) => {
                if let Some(task) = entry.task {
                    task.abort();
                }
                info!("Unsubscribed chart {}", chart_id);
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self, chart_id: &str) -> bool {
        self.lock_state().entries.contains_key(chart_id)
    }

    pub fn state(&self, chart_id: &str) -> SubscriptionState {
        let state = self.lock_state();
        match state.entries.get(chart_id) {
            Some(entry) => entry.state,
            None if state.removed.contains(chart_id) => SubscriptionState::Removed,
            None => SubscriptionState::Idle,
        }
    }

    /// When the next scheduled refresh of `chart_id` fires.
    pub fn next_fire_at(&self, chart_id: &str) -> Option<Instant> {
        self.lock_state()
            .entries
            .get(chart_id)
            .and_then(|entry| entry.next_fire_at)
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock_state()
            .entries
            .iter()
            .map(|(chart_id, entry)| Subscription {
                chart_id: chart_id.clone(),
                spec: entry.spec.clone(),
                state: entry.state,
                next_fire_at: entry.next_fire_at,
                refresh_count: entry.refresh_count,
                consecutive_failures: entry.consecutive_failures,
            })
            .collect()
    }

    /// Cancel every refresh loop. Further subscriptions are refused.
    pub fn close(&self) {
        let mut state = self.lock_state();
        state.closed = true;
        let count = state.entries.len();
        for (_, entry) in state.entries.drain() {
            if let Some(task) = entry.task {
                task.abort();
            }
        }
        if count > 0 {
            info!("Scheduler closed, cancelled {} subscriptions", count);
        }
    }

    /// Mark the start of a fetch. Returns the chart spec if `generation` is current.
    fn begin_fetch(&self, chart_id: &str, generation: u64) -> Option<ChartSpec> {
        let mut state = self.lock_state();
        let entry = state.entries.get_mut(chart_id)?;
        if entry.generation != generation {
            return None;
        }
        entry.state = SubscriptionState::Fetching;
        entry.next_fire_at = None;
        Some(entry.spec.clone())
    }

    /// Whether the emitter already holds upstream data for `chart_id`.
    fn has_real_payload(&self, chart_id: &str) -> bool {
        self.emitter
            .get_chart(chart_id)
            .is_some_and(|payload| !payload.source.is_synthetic())
    }

    fn is_current(&self, chart_id: &str, generation: u64) -> bool {
        self.lock_state()
            .entries
            .get(chart_id)
            .is_some_and(|entry| entry.generation == generation)
    }

    /// Record the refresh outcome and arm the next one. Returns false if the
    /// subscription was superseded or removed meanwhile.
    fn arm(&self, chart_id: &str, generation: u64, succeeded: bool, interval: Duration) -> bool {
        let mut state = self.lock_state();
        let Some(entry) = state.entries.get_mut(chart_id) else {
            return false;
        };
        if entry.generation != generation {
            return false;
        }
        if succeeded {
            entry.refresh_count += 1;
            entry.consecutive_failures = 0;
        } else {
            entry.consecutive_failures += 1;
        }
        entry.state = SubscriptionState::Scheduled;
        entry.next_fire_at = Some(Instant::now() + interval);
        true
    }

    async fn run(self: Arc<Self>, chart_id: String, generation: u64) {
        // Only the first fetch after (re)subscribing may be served from memory
        let mut use_cache = true;
        loop {
            let Some(spec) = self.begin_fetch(&chart_id, generation) else {
                return;
            };

            let outcome = self.loader.load(&spec, use_cache).await;
            use_cache = false;

            if !self.is_current(&chart_id, generation) {
                debug!("Refresh of {} superseded, discarding result", chart_id);
                return;
            }

            let succeeded = match outcome {
                Ok(payload)
                    if payload.source.is_synthetic() && self.has_real_payload(&chart_id) =>
                {
                    warn!(
                        "Refresh of {} produced only synthetic data, keeping last real value",
                        chart_id
                    );
                    false
                }
                Ok(payload) => {
                    self.emitter.update_chart(&chart_id, payload);
                    true
                }
                Err(e) => {
                    warn!("Refresh of {} failed, keeping last value: {}", chart_id, e);
                    false
                }
            };

            let interval = spec.timeframe().refresh_interval();
            if !self.arm(&chart_id, generation, succeeded, interval) {
                return;
            }
            debug!("Next refresh of {} in {:?}", chart_id, interval);
            tokio::time::sleep(interval).await;
        }
    }
}
