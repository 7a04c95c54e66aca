//! End-to-end tests of the engine against a scripted provider.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use async_trait::async_trait;
use chartsync_core::{ChartEvent, Engine, EngineConfig, MemoryStore, RecordingListener};
use chartsync_market_data::{
    Aggregate, AggregatesProvider, AggregatesRequest, AggregatesResponse, DataSource,
    MarketDataError,
};

/// Provider answering from a script of outcomes, then with a fixed bar.
struct ScriptedProvider {
    script: Mutex<VecDeque<Result<AggregatesResponse, MarketDataError>>>,
    calls: Mutex<u32>,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<AggregatesResponse, MarketDataError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

fn bar_for(request: &AggregatesRequest) -> AggregatesResponse {
    let millis = request
        .to
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp_millis();
    AggregatesResponse::with_results(vec![Aggregate::close_only(millis, 42.5)])
}

#[async_trait]
impl AggregatesProvider for ScriptedProvider {
    fn id(&self) -> &'static str {
        "SCRIPTED"
    }

    async fn fetch_aggregates(
        &self,
        request: &AggregatesRequest,
    ) -> Result<AggregatesResponse, MarketDataError> {
        *self.calls.lock().unwrap() += 1;
        self.call_times.lock().unwrap().push(Instant::now());
        match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(bar_for(request)),
        }
    }
}

fn rate_limited() -> Result<AggregatesResponse, MarketDataError> {
    Err(MarketDataError::RateLimited {
        provider: "SCRIPTED".to_string(),
    })
}

#[tokio::test(start_paused = true)]
async fn rate_limited_calls_are_retried_until_real_data_arrives() {
    let provider = Arc::new(ScriptedProvider::new(vec![rate_limited(), rate_limited()]));
    let engine = Engine::new(
        EngineConfig::default(),
        provider.clone(),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    let series = engine.request_series("AAPL", "1m").await.unwrap();

    assert_eq!(series.source, DataSource::Real);
    assert_eq!(series.points.len(), 1);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fall_back_to_synthetic_data() {
    let script = (0..8).map(|_| rate_limited()).collect();
    let provider = Arc::new(ScriptedProvider::new(script));
    let engine = Engine::new(
        EngineConfig::default(),
        provider.clone(),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    let series = engine.request_series("AAPL", "1m").await.unwrap();

    // One queued per-symbol task: the first try plus three retries
    assert_eq!(provider.calls(), 4);
    assert_eq!(series.source, DataSource::Synthetic);
    assert!(!series.points.is_empty());
}

#[tokio::test(start_paused = true)]
async fn chart_updates_reach_listeners_as_json_ready_events() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let engine = Engine::new(
        EngineConfig::default(),
        provider,
        Arc::new(MemoryStore::new()),
    )
    .unwrap();
    let listener = RecordingListener::new();

    engine.subscribe("AAPL_1w", listener.clone()).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let event = listener.last().unwrap();
    assert!(matches!(event, ChartEvent::Updated { .. }));
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["id"], "AAPL_1w");
    assert_eq!(json["payload"]["source"], "real");
    assert_eq!(json["payload"]["result"]["single"]["config"]["data"][0]["value"], 42.5);
}

#[tokio::test(start_paused = true)]
async fn upstream_requests_never_exceed_the_quota() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let mut config = EngineConfig::default();
    config.rate_limit.max_per_window = 2;
    config.queue.min_spacing = Duration::from_millis(10);
    let engine = Arc::new(
        Engine::new(config, provider.clone(), Arc::new(MemoryStore::new())).unwrap(),
    );
    let start = Instant::now();

    let symbols = ["AAPL", "MSFT", "GOOG", "AMZN", "META", "NVDA", "TSLA", "NFLX", "AMD", "INTC"];
    let tasks: Vec<_> = symbols
        .iter()
        .map(|&symbol| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.request_series(symbol, "1m").await })
        })
        .collect();

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(provider.calls(), 2);

    for task in tasks {
        let series = task.await.unwrap().unwrap();
        assert_eq!(series.source, DataSource::Real);
    }
    let times = provider.call_times();
    assert_eq!(times.len(), symbols.len());
    for (i, at) in times.iter().enumerate() {
        let in_window = times[i..]
            .iter()
            .take_while(|other| other.duration_since(*at) < Duration::from_secs(60))
            .count();
        assert!(in_window <= 2, "{} calls within a minute of {:?}", in_window, *at - start);
    }
}
