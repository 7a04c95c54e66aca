use serde::Serialize;
use tokio::time::Instant;

use crate::charts::ChartSpec;

/// Lifecycle of a chart subscription.
///
/// `Idle -> Fetching -> Scheduled -> Fetching -> ...`; `Removed` is terminal
/// until the chart is subscribed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Idle,
    Fetching,
    Scheduled,
    Removed,
}

/// Point-in-time view of one subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub chart_id: String,
    pub spec: ChartSpec,
    pub state: SubscriptionState,
    pub next_fire_at: Option<Instant>,
    pub refresh_count: u64,
    pub consecutive_failures: u32,
}
