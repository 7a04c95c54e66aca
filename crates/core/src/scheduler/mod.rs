//! Chart subscription scheduling.
//!
//! - [`ChartLoader`] - builds payloads for single and comparison charts
//! - [`SubscriptionScheduler`] - one refresh loop per subscribed chart

mod loader;
mod service;
mod subscription;


pub use loader::ChartLoader;
pub use service::SubscriptionScheduler;
pub use subscription::{Subscription, SubscriptionState};
