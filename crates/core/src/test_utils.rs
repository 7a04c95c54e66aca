//! Shared fixtures for the engine's unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Days, NaiveDate};

use chartsync_market_data::{
    Aggregate, AggregatesProvider, AggregatesRequest, AggregatesResponse, DataSource,
    MarketDataError, TimeSeriesPoint, Timeframe,
};
use rust_decimal::Decimal;

use crate::charts::ChartPayload;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Single-series payload with one point.
pub fn single_payload(symbol: &str, value: Decimal) -> ChartPayload {
    ChartPayload::single(
        symbol,
        Timeframe::parse("1m").unwrap(),
        vec![TimeSeriesPoint::new(date(2024, 1, 2), value)],
        DataSource::Real,
    )
}

/// Millisecond timestamp of midnight UTC on `day`.
fn millis(day: NaiveDate) -> i64 {
    day.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis()
}

/// Three daily bars ending on the request's `to` date, valued from `base`.
pub fn bars_for(request: &AggregatesRequest, base: f64) -> Vec<Aggregate> {
    (0..3u64)
        .rev()
        .map(|back| {
            let day = request.to.checked_sub_days(Days::new(back)).unwrap();
            Aggregate::close_only(millis(day), base + (2 - back) as f64)
        })
        .collect()
}

/// How the mock answers a symbol.
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// Bars valued from the given base
    Bars(f64),
    /// A successful response without results
    Empty,
    /// Always fail with a fatal provider error
    Fail,
    /// Fail with a 429 this many times, then succeed
    RateLimitedTimes(u32),
}

#[derive(Default)]
struct MockState {
    behaviors: HashMap<String, MockBehavior>,
    single_calls: Vec<String>,
    grouped_calls: Vec<Vec<String>>,
    fail_grouped: bool,
    rate_limited_left: HashMap<String, u32>,
}

/// Scriptable provider recording every call it receives.
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, symbol: &str, behavior: MockBehavior) {
        let mut state = self.state.lock().unwrap();
        if let MockBehavior::RateLimitedTimes(n) = behavior {
            state.rate_limited_left.insert(symbol.to_string(), n);
        }
        state.behaviors.insert(symbol.to_string(), behavior);
    }

    /// Make every grouped call fail as a whole.
    pub fn fail_grouped(&self, fail: bool) {
        self.state.lock().unwrap().fail_grouped = fail;
    }

    pub fn single_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().single_calls.clone()
    }

    pub fn grouped_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().grouped_calls.clone()
    }

    /// Total upstream calls (grouped calls count once).
    pub fn total_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.single_calls.len() + state.grouped_calls.len()
    }

    fn respond(&self, request: &AggregatesRequest) -> Result<AggregatesResponse, MarketDataError> {
        let mut state = self.state.lock().unwrap();
        let behavior = state
            .behaviors
            .get(&request.symbol)
            .cloned()
            .unwrap_or(MockBehavior::Bars(100.0));
        match behavior {
            MockBehavior::Bars(base) => Ok(AggregatesResponse::with_results(bars_for(request, base))),
            MockBehavior::Empty => Ok(AggregatesResponse::default()),
            MockBehavior::Fail => Err(MarketDataError::ProviderError {
                provider: "MOCK".to_string(),
                message: format!("no data for {}", request.symbol),
            }),
            MockBehavior::RateLimitedTimes(_) => {
                let left = state
                    .rate_limited_left
                    .entry(request.symbol.clone())
                    .or_insert(0);
                if *left > 0 {
                    *left -= 1;
                    Err(MarketDataError::RateLimited {
                        provider: "MOCK".to_string(),
                    })
                } else {
                    Ok(AggregatesResponse::with_results(bars_for(request, 100.0)))
                }
            }
        }
    }
}

#[async_trait]
impl AggregatesProvider for MockProvider {
    fn id(&self) -> &'static str {
        "MOCK"
    }

    fn supports_grouped(&self) -> bool {
        true
    }

    async fn fetch_aggregates(
        &self,
        request: &AggregatesRequest,
    ) -> Result<AggregatesResponse, MarketDataError> {
        self.state
            .lock()
            .unwrap()
            .single_calls
            .push(request.symbol.clone());
        self.respond(request)
    }

    async fn fetch_grouped(
        &self,
        requests: &[AggregatesRequest],
    ) -> Result<HashMap<String, AggregatesResponse>, MarketDataError> {
        let fail = {
            let mut state = self.state.lock().unwrap();
            state
                .grouped_calls
                .push(requests.iter().map(|r| r.symbol.clone()).collect());
            state.fail_grouped
        };
        if fail {
            return Err(MarketDataError::ProviderError {
                provider: "MOCK".to_string(),
                message: "grouped endpoint unavailable".to_string(),
            });
        }

        let mut responses = HashMap::new();
        for request in requests {
            responses.insert(request.symbol.clone(), self.respond(request)?);
        }
        Ok(responses)
    }
}
