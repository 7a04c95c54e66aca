//! Upstream provider trait definitions.
//!
//! This module defines the `AggregatesProvider` trait that every upstream
//! time-series source implements. The engine never calls a provider directly;
//! all calls are wrapped in tasks on the [`RequestQueue`](crate::dispatch::RequestQueue).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{AggregatesRequest, AggregatesResponse};

/// Trait for upstream aggregate-bar providers.
///
/// Only read requests are ever issued, so every call is idempotent and safe
/// for the retry executor to repeat.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use chartsync_market_data::provider::AggregatesProvider;
///
/// struct MyProvider;
///
/// #[async_trait]
/// impl AggregatesProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     async fn fetch_aggregates(
///         &self,
///         request: &AggregatesRequest,
///     ) -> Result<AggregatesResponse, MarketDataError> {
///         // ... call the API
///     }
/// }
/// ```
#[async_trait]
pub trait AggregatesProvider: Send + Sync {
    /// Unique identifier for this provider, used in logs and error values.
    fn id(&self) -> &'static str;

    /// Fetch aggregate bars for one symbol over one date range.
    async fn fetch_aggregates(
        &self,
        request: &AggregatesRequest,
    ) -> Result<AggregatesResponse, MarketDataError>;

    /// Whether [`fetch_grouped`](Self::fetch_grouped) is served by a single
    /// upstream request.
    ///
    /// When false, callers queue one rate-limited task per symbol instead of
    /// one grouped task, so the quota is charged per real request.
    fn supports_grouped(&self) -> bool {
        false
    }

    /// Fetch several symbols as one grouped operation.
    ///
    /// The default implementation issues the requests one after another and
    /// fails the whole group on the first error. Providers with a native
    /// multi-symbol endpoint should override it together with
    /// [`supports_grouped`](Self::supports_grouped).
    async fn fetch_grouped(
        &self,
        requests: &[AggregatesRequest],
    ) -> Result<HashMap<String, AggregatesResponse>, MarketDataError> {
        let mut responses = HashMap::with_capacity(requests.len());
        for request in requests {
            let response = self.fetch_aggregates(request).await?;
            responses.insert(request.symbol.clone(), response);
        }
        Ok(responses)
    }
}
