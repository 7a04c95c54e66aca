//! Polygon-style aggregates provider.
//!
//! Fetches daily/weekly OHLCV bars from an aggregates endpoint that follows the
//! Polygon.io v2 layout.
//!
//! # API Endpoint
//!
//! `GET {base}/v2/aggs/ticker/{symbol}/range/{multiplier}/{timespan}/{from}/{to}?adjusted=true&sort=asc&limit=50000&apiKey={key}`
//!
//! # Response Format
//!
//! ```json
//! {"ticker": "AAPL", "status": "OK", "resultsCount": 1,
//!  "results": [{"t": 1673240400000, "o": 130.4, "h": 133.4, "l": 129.8, "c": 130.1, "v": 70790813, "vw": 131.6, "n": 645365}]}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode, Url};

use crate::errors::MarketDataError;
use crate::models::{AggregatesRequest, AggregatesResponse};
use crate::provider::AggregatesProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
const PROVIDER_ID: &str = "POLYGON";

/// Upper bound on bars returned per call.
const RESULT_LIMIT: &str = "50000";

/// Default HTTP request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Aggregates provider speaking the Polygon v2 REST layout.
///
/// # Example
///
/// ```ignore
/// let provider = PolygonProvider::new("your-api-key".to_string());
/// let response = provider.fetch_aggregates(&request).await?;
/// ```
pub struct PolygonProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl PolygonProvider {
    /// Create a provider against the public Polygon endpoint.
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Create a provider against a compatible endpoint (proxy, mirror, sandbox).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn build_url(&self, request: &AggregatesRequest) -> Result<Url, MarketDataError> {
        let raw = format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            self.base_url,
            request.symbol,
            request.multiplier,
            request.timespan.as_str(),
            request.from.format("%Y-%m-%d"),
            request.to.format("%Y-%m-%d"),
        );

        Url::parse_with_params(
            &raw,
            &[
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", RESULT_LIMIT),
                ("apiKey", self.api_key.as_str()),
            ],
        )
        .map_err(|e| MarketDataError::ProviderError {
            provider: PROVIDER_ID.to_string(),
            message: format!("Failed to build URL: {}", e),
        })
    }

    /// The request URL with the `apiKey` query value masked, for logging.
    fn redacted(url: &Url) -> String {
        let mut masked = url.clone();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| {
                let value = if key == "apiKey" {
                    "***".to_string()
                } else {
                    value.into_owned()
                };
                (key.into_owned(), value)
            })
            .collect();
        masked.query_pairs_mut().clear().extend_pairs(pairs);
        masked.to_string()
    }

    fn map_transport_error(e: reqwest::Error) -> MarketDataError {
        if e.is_timeout() {
            MarketDataError::Timeout {
                provider: PROVIDER_ID.to_string(),
            }
        } else {
            MarketDataError::Network {
                provider: PROVIDER_ID.to_string(),
                message: e.to_string(),
            }
        }
    }

    /// Map an HTTP status and body to a response or a classified error.
    fn parse_response(
        symbol: &str,
        status: StatusCode,
        body: &str,
    ) -> Result<AggregatesResponse, MarketDataError> {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }

        if !status.is_success() {
            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
            });
        }

        let response: AggregatesResponse =
            serde_json::from_str(body).map_err(|e| MarketDataError::UpstreamData {
                symbol: symbol.to_string(),
                message: format!("Failed to parse response: {}", e),
            })?;

        if let Some(status) = response.status.as_deref() {
            if status.eq_ignore_ascii_case("ERROR") {
                let message = match response.error.as_deref() {
                    Some(error) => format!("API returned status {}: {}", status, error),
                    None => format!("API returned status: {}", status),
                };
                return Err(MarketDataError::ProviderError {
                    provider: PROVIDER_ID.to_string(),
                    message,
                });
            }
        }

        Ok(response)
    }
}

#[async_trait]
impl AggregatesProvider for PolygonProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_aggregates(
        &self,
        request: &AggregatesRequest,
    ) -> Result<AggregatesResponse, MarketDataError> {
        let url = self.build_url(request)?;
        debug!("Polygon request: {}", Self::redacted(&url));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(Self::map_transport_error)?;

        Self::parse_response(&request.symbol, status, &body)
    }
}
