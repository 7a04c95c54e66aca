//! Latest-value store and fan-out for chart payloads.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, warn};

use super::{ChartEvent, ChartListener};
use crate::cache::TieredCache;
use crate::charts::ChartPayload;
use crate::constants::WILDCARD_CHART_ID;
use crate::errors::CacheError;

fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("{} mutex was poisoned, recovering", what);
        poisoned.into_inner()
    })
}

#[derive(Default)]
struct Inbox {
    queue: VecDeque<(u64, ChartEvent)>,
    draining: bool,
    /// Highest sequence delivered per chart id.
    delivered: HashMap<String, u64>,
}

/// A listener plus its ordered delivery state.
///
/// Events are stamped with the sequence number assigned under the emitter lock.
/// Whichever thread finds the inbox idle drains it; an event older than one
/// already delivered for the same chart is dropped, so a listener never ends
/// on a stale payload even when replay and fan-out race.
struct Subscriber {
    id: u64,
    listener: Arc<dyn ChartListener>,
    inbox: Mutex<Inbox>,
}

impl Subscriber {
    fn new(id: u64, listener: Arc<dyn ChartListener>) -> Self {
        Self {
            id,
            listener,
            inbox: Mutex::new(Inbox::default()),
        }
    }

    fn deliver(&self, seq: u64, event: ChartEvent) {
        {
            let mut inbox = lock_or_recover(&self.inbox, "Listener inbox");
            inbox.queue.push_back((seq, event));
            if inbox.draining {
                return;
            }
            inbox.draining = true;
        }

        loop {
            let next = {
                let mut inbox = lock_or_recover(&self.inbox, "Listener inbox");
                let Some((seq, event)) = inbox.queue.pop_front() else {
                    inbox.draining = false;
                    return;
                };
                let last = inbox.delivered.entry(event.id().to_string()).or_insert(0);
                if seq <= *last {
                    debug!("Dropping stale event #{} for {}", seq, event.id());
                    None
                } else {
                    *last = seq;
                    Some(event)
                }
            };
            if let Some(event) = next {
                self.listener.on_event(&event);
            }
        }
    }
}

struct StoredChart {
    payload: Arc<ChartPayload>,
    seq: u64,
}

#[derive(Default)]
struct EmitterState {
    charts: HashMap<String, StoredChart>,
    listeners: HashMap<String, Vec<Arc<Subscriber>>>,
    /// Ids removed explicitly. Updates to them are dropped until revived.
    removed: HashSet<String>,
    next_listener_id: u64,
    /// Last sequence handed out. Starts at zero so every event is newer.
    last_seq: u64,
}

impl EmitterState {
    fn listeners_for(&self, chart_id: &str) -> Vec<Arc<Subscriber>> {
        self.listeners
            .get(chart_id)
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    fn next_seq(&mut self) -> u64 {
        self.last_seq += 1;
        self.last_seq
    }
}

/// Holds the latest payload of every chart and notifies listeners.
///
/// Listeners registered under a chart id receive that chart's events; listeners
/// registered under `"*"` receive every update and removal. Listeners are
/// always invoked after the internal lock is released, and each listener sees
/// a chart's events in publication order.
pub struct ChartEmitter {
    state: Mutex<EmitterState>,
    cache: Arc<TieredCache>,
}

impl ChartEmitter {
    pub fn new(cache: Arc<TieredCache>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EmitterState::default()),
            cache,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, EmitterState> {
        lock_or_recover(&self.state, "Chart emitter")
    }

    /// Load persisted charts so they replay before the first refresh.
    ///
    /// Returns how many charts were loaded.
    pub fn warm_from_cache(&self) -> Result<usize, CacheError> {
        let entries = self.cache.persisted_charts()?;
        let mut state = self.lock_state();
        let mut loaded = 0;
        for entry in entries {
            if state.removed.contains(&entry.key) || state.charts.contains_key(&entry.key) {
                continue;
            }
            let seq = state.next_seq();
            state.charts.insert(
                entry.key,
                StoredChart {
                    payload: entry.payload,
                    seq,
                },
            );
            loaded += 1;
        }
        debug!("Warmed chart emitter with {} persisted charts", loaded);
        Ok(loaded)
    }

    /// Register a listener.
    ///
    /// If the chart already has a payload, the listener receives it before this
    /// returns. Wildcard listeners receive every known chart.
    pub fn subscribe(
        self: &Arc<Self>,
        chart_id: &str,
        listener: Arc<dyn ChartListener>,
    ) -> ListenerHandle {
        let (subscriber, replay) = {
            let mut state = self.lock_state();
            let listener_id = state.next_listener_id;
            state.next_listener_id += 1;
            let subscriber = Arc::new(Subscriber::new(listener_id, listener));
            state
                .listeners
                .entry(chart_id.to_string())
                .or_default()
                .push(Arc::clone(&subscriber));

            let replay: Vec<(u64, ChartEvent)> = state
                .charts
                .iter()
                .filter(|(id, _)| chart_id == WILDCARD_CHART_ID || id.as_str() == chart_id)
                .map(|(id, stored)| {
                    (
                        stored.seq,
                        ChartEvent::Updated {
                            id: id.clone(),
                            payload: Arc::clone(&stored.payload),
                        },
                    )
                })
                .collect();
            (subscriber, replay)
        };

        for (seq, event) in replay {
            subscriber.deliver(seq, event);
        }

        ListenerHandle {
            emitter: Arc::downgrade(self),
            chart_id: chart_id.to_string(),
            listener_id: subscriber.id,
        }
    }

    fn unsubscribe_listener(&self, chart_id: &str, listener_id: u64) -> bool {
        let mut state = self.lock_state();
        let Some(listeners) = state.listeners.get_mut(chart_id) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|subscriber| subscriber.id != listener_id);
        let removed = listeners.len() < before;
        if listeners.is_empty() {
            state.listeners.remove(chart_id);
        }
        removed
    }

    /// Publish a new payload for `chart_id`.
    ///
    /// The payload is written through to the persisted tier and then delivered
    /// to the chart's listeners and to wildcard listeners. Returns false when
    /// the update was dropped because the chart was removed.
    pub fn update_chart(&self, chart_id: &str, payload: ChartPayload) -> bool {
        if chart_id == WILDCARD_CHART_ID {
            warn!("Ignoring update addressed to the wildcard chart id");
            return false;
        }
        if self.is_removed(chart_id) {
            debug!("Dropping update for removed chart {}", chart_id);
            return false;
        }

        if let Err(e) = self.cache.set_chart(chart_id, &payload) {
            warn!("Failed to persist chart {}: {}", chart_id, e);
        }

        let payload = Arc::new(payload);
        let (seq, listeners) = {
            let mut state = self.lock_state();
            if state.removed.contains(chart_id) {
                drop(state);
                debug!("Chart {} removed while publishing, dropping update", chart_id);
                if let Err(e) = self.cache.remove_chart(chart_id) {
                    warn!("Failed to drop persisted chart {}: {}", chart_id, e);
                }
                return false;
            }
            let seq = state.next_seq();
            state.charts.insert(
                chart_id.to_string(),
                StoredChart {
                    payload: Arc::clone(&payload),
                    seq,
                },
            );
            let mut listeners = state.listeners_for(chart_id);
            listeners.extend(state.listeners_for(WILDCARD_CHART_ID));
            (seq, listeners)
        };

        let event = ChartEvent::Updated {
            id: chart_id.to_string(),
            payload,
        };
        for subscriber in listeners {
            subscriber.deliver(seq, event.clone());
        }
        true
    }

    /// Remove a chart: drop its payload and listeners, delete it from the
    /// persisted tier and tell wildcard listeners.
    ///
    /// Later updates for the id are dropped until [`revive`](Self::revive).
    pub fn remove_chart(&self, chart_id: &str) {
        let (seq, wildcard) = {
            let mut state = self.lock_state();
            state.charts.remove(chart_id);
            state.listeners.remove(chart_id);
            state.removed.insert(chart_id.to_string());
            (state.next_seq(), state.listeners_for(WILDCARD_CHART_ID))
        };

        if let Err(e) = self.cache.remove_chart(chart_id) {
            warn!("Failed to delete persisted chart {}: {}", chart_id, e);
        }

        let event = ChartEvent::Removed {
            id: chart_id.to_string(),
        };
        for subscriber in wildcard {
            subscriber.deliver(seq, event.clone());
        }
        debug!("Removed chart {}", chart_id);
    }

    /// Accept updates for a previously removed chart again.
    pub fn revive(&self, chart_id: &str) -> bool {
        self.lock_state().removed.remove(chart_id)
    }

    pub fn is_removed(&self, chart_id: &str) -> bool {
        self.lock_state().removed.contains(chart_id)
    }

    pub fn get_chart(&self, chart_id: &str) -> Option<Arc<ChartPayload>> {
        self.lock_state()
            .charts
            .get(chart_id)
            .map(|stored| Arc::clone(&stored.payload))
    }

    /// Snapshot of every chart's latest payload.
    pub fn get_all_charts(&self) -> HashMap<String, Arc<ChartPayload>> {
        self.lock_state()
            .charts
            .iter()
            .map(|(id, stored)| (id.clone(), Arc::clone(&stored.payload)))
            .collect()
    }

    pub fn listener_count(&self, chart_id: &str) -> usize {
        self.lock_state()
            .listeners
            .get(chart_id)
            .map_or(0, |listeners| listeners.len())
    }

    /// Drop every listener. Payloads are kept.
    pub fn clear_listeners(&self) {
        self.lock_state().listeners.clear();
    }
}

/// Handle returned by [`ChartEmitter::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to detach it.
pub struct ListenerHandle {
    emitter: Weak<ChartEmitter>,
    chart_id: String,
    listener_id: u64,
}

impl ListenerHandle {
    pub fn chart_id(&self) -> &str {
        &self.chart_id
    }

    /// Detach the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.emitter.upgrade() {
            Some(emitter) => emitter.unsubscribe_listener(&self.chart_id, self.listener_id),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingListener;
    use crate::test_utils::single_payload;
    use rust_decimal_macros::dec;

    fn updated(value: rust_decimal::Decimal) -> ChartEvent {
        ChartEvent::Updated {
            id: "AAPL_1m".to_string(),
            payload: Arc::new(single_payload("AAPL", value)),
        }
    }

    #[test]
    fn test_subscriber_drops_event_older_than_delivered() {
        let listener = RecordingListener::new();
        let subscriber = Subscriber::new(0, Arc::new(listener.clone()));

        subscriber.deliver(2, updated(dec!(2)));
        subscriber.deliver(1, updated(dec!(1)));

        let events = listener.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].payload().unwrap().result,
            single_payload("AAPL", dec!(2)).result
        );
    }

    #[test]
    fn test_subscriber_tracks_sequences_per_chart() {
        let listener = RecordingListener::new();
        let subscriber = Subscriber::new(0, Arc::new(listener.clone()));

        subscriber.deliver(5, updated(dec!(5)));
        subscriber.deliver(
            3,
            ChartEvent::Removed {
                id: "MSFT_1m".to_string(),
            },
        );

        assert_eq!(listener.len(), 2);
    }
}

