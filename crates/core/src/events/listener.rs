//! Chart listener trait and implementations.

use std::sync::{Arc, Mutex, MutexGuard};

use log::warn;

use super::ChartEvent;

/// Receives chart events.
///
/// # Design Rules
///
/// - `on_event()` runs on the publishing task and must return quickly
/// - Listeners are invoked outside the emitter's lock, so they may call back
///   into the engine (subscribe, remove a chart, ...)
pub trait ChartListener: Send + Sync {
    fn on_event(&self, event: &ChartEvent);
}

impl<F> ChartListener for F
where
    F: Fn(&ChartEvent) + Send + Sync,
{
    fn on_event(&self, event: &ChartEvent) {
        self(event)
    }
}

/// Listener that records every event it receives.
#[derive(Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<ChartEvent>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_events(&self) -> MutexGuard<'_, Vec<ChartEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| {
            warn!("Recording listener mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Returns all collected events.
    pub fn events(&self) -> Vec<ChartEvent> {
        self.lock_events().clone()
    }

    /// Collected events for one chart id.
    pub fn events_for(&self, chart_id: &str) -> Vec<ChartEvent> {
        self.lock_events()
            .iter()
            .filter(|e| e.id() == chart_id)
            .cloned()
            .collect()
    }

    pub fn last(&self) -> Option<ChartEvent> {
        self.lock_events().last().cloned()
    }

    pub fn clear(&self) {
        self.lock_events().clear();
    }

    pub fn len(&self) -> usize {
        self.lock_events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_events().is_empty()
    }
}

impl ChartListener for RecordingListener {
    fn on_event(&self, event: &ChartEvent) {
        self.lock_events().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closures_are_listeners() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let listener = move |_: &ChartEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        };

        listener.on_event(&ChartEvent::Removed {
            id: "A_1m".to_string(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_recording_listener_collects_events() {
        let listener = RecordingListener::new();
        assert!(listener.is_empty());

        listener.on_event(&ChartEvent::Removed {
            id: "A_1m".to_string(),
        });
        listener.on_event(&ChartEvent::Removed {
            id: "B_1m".to_string(),
        });
        assert_eq!(listener.len(), 2);
        assert_eq!(listener.events_for("B_1m").len(), 1);
        assert_eq!(listener.last().unwrap().id(), "B_1m");

        listener.clear();
        assert!(listener.is_empty());
    }
}
