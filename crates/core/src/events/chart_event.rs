use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::charts::ChartPayload;

/// Notification delivered to chart listeners.
///
/// Serializes as `{id, payload}` for updates and `{id, removed: true}` for
/// removals.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartEvent {
    Updated {
        id: String,
        payload: Arc<ChartPayload>,
    },
    Removed {
        id: String,
    },
}

impl ChartEvent {
    pub fn id(&self) -> &str {
        match self {
            ChartEvent::Updated { id, .. } | ChartEvent::Removed { id } => id,
        }
    }

    pub fn payload(&self) -> Option<&Arc<ChartPayload>> {
        match self {
            ChartEvent::Updated { payload, .. } => Some(payload),
            ChartEvent::Removed { .. } => None,
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, ChartEvent::Removed { .. })
    }
}

impl Serialize for ChartEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ChartEvent", 2)?;
        match self {
            ChartEvent::Updated { id, payload } => {
                state.serialize_field("id", id)?;
                state.serialize_field("payload", payload.as_ref())?;
            }
            ChartEvent::Removed { id } => {
                state.serialize_field("id", id)?;
                state.serialize_field("removed", &true)?;
            }
        }
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_event_json() {
        let event = ChartEvent::Removed {
            id: "AAPL_1m".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"id": "AAPL_1m", "removed": true})
        );
        assert!(event.is_removal());
        assert!(event.payload().is_none());
    }
}
