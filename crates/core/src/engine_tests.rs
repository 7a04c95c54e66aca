//! Tests for the Engine facade.
//!
//! # Critical Contract Points
//!
//! 1. Concurrent series requests for one timeframe share grouped upstream calls
//! 2. Initial loads use the memory tier; scheduled refreshes always go upstream
//! 3. The global rate limit holds across every caller
//! 4. Removed charts stay removed; persisted charts survive a restart

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chartsync_market_data::{DataSource, RateLimiterConfig};

    use crate::cache::{MemoryStore, PersistentStore};
    use crate::charts::{ChartResult, ChartSpec};
    use crate::config::EngineConfig;
    use crate::engine::Engine;
    use crate::errors::Error;
    use crate::events::{ChartEvent, RecordingListener};
    use crate::scheduler::SubscriptionState;
    use crate::test_utils::{single_payload, MockProvider};
    use rust_decimal_macros::dec;

    fn fast_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.rate_limit = RateLimiterConfig {
            max_per_window: 1000,
            window: Duration::from_secs(60),
        };
        config.queue.min_spacing = Duration::from_millis(10);
        config.queue.loop_delay = Duration::from_millis(1);
        config
    }

    fn engine_with(config: EngineConfig, store: Arc<dyn PersistentStore>) -> (Engine, MockProvider) {
        let provider = MockProvider::new();
        let engine = Engine::new(config, Arc::new(provider.clone()), store).unwrap();
        (engine, provider)
    }

    fn engine() -> (Engine, MockProvider) {
        engine_with(fast_config(), Arc::new(MemoryStore::new()))
    }

    // =========================================================================
    // Series requests
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_share_one_grouped_call() {
        let (engine, provider) = engine();

        let (a, b, c) = tokio::join!(
            engine.request_series("AAPL", "1m"),
            engine.request_series("MSFT", "1m"),
            engine.request_series("GOOG", "1m"),
        );

        assert_eq!(a.unwrap().symbol, "AAPL");
        assert_eq!(b.unwrap().symbol, "MSFT");
        assert_eq!(c.unwrap().source, DataSource::Real);
        assert_eq!(provider.grouped_calls().len(), 1);
        assert_eq!(provider.grouped_calls()[0].len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_request_is_served_from_memory() {
        let (engine, provider) = engine();
        let first = engine.request_series("AAPL", "1m").await.unwrap();
        let calls = provider.total_calls();

        let second = engine.request_series("AAPL", "1m").await.unwrap();

        assert_eq!(provider.total_calls(), calls);
        assert_eq!(first.points, second.points);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognized_timeframe_means_thirty_days() {
        let (engine, _) = engine();
        let series = engine.request_series("AAPL", "soon").await.unwrap();
        assert_eq!(series.timeframe.to_string(), "30d");
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_rate_limit_defers_excess_calls() {
        let mut config = fast_config();
        config.rate_limit = RateLimiterConfig {
            max_per_window: 2,
            window: Duration::from_secs(60),
        };
        let (engine, provider) = engine_with(config, Arc::new(MemoryStore::new()));
        let engine = Arc::new(engine);

        // Three timeframes -> three grouped calls
        let mut tasks = Vec::new();
        for tf in ["1w", "1m", "1y"] {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                engine.request_series("AAPL", tf).await
            }));
        }

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.total_calls(), 2);
        assert_eq!(engine.remaining_quota(), 0);

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(provider.total_calls(), 3);
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_comparison() {
        let (engine, provider) = engine();
        let payload = engine
            .fetch_comparison(&["AAPL", "MSFT", "GOOG"], "1m")
            .await
            .unwrap();

        match payload.result {
            ChartResult::Comparison { config, series } => {
                assert_eq!(series.len(), 3);
                assert!(config.data.iter().all(|row| row.values.len() == 3));
            }
            other => panic!("expected comparison, got {:?}", other),
        }
        assert_eq!(provider.grouped_calls().len(), 1);
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_schedules_chart_and_delivers_updates() {
        let (engine, _) = engine();
        let listener = RecordingListener::new();

        engine.subscribe("AAPL_1m", listener.clone()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(listener.len(), 1);
        assert_eq!(
            engine.subscription_state("AAPL_1m"),
            SubscriptionState::Scheduled
        );
        assert!(engine.next_fire_at("AAPL_1m").is_some());
        assert!(engine.get_chart("AAPL_1m").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_listener_does_not_restart_schedule() {
        let (engine, provider) = engine();
        engine.subscribe("AAPL_1m", RecordingListener::new()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let calls = provider.total_calls();
        let next = engine.next_fire_at("AAPL_1m");

        let late = RecordingListener::new();
        engine.subscribe("AAPL_1m", late.clone()).unwrap();

        // Replayed synchronously from the cached payload
        assert_eq!(late.len(), 1);
        assert_eq!(engine.next_fire_at("AAPL_1m"), next);
        assert_eq!(provider.total_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_refresh_bypasses_memory_tier() {
        let (engine, provider) = engine();
        engine.subscribe("AAPL_1m", RecordingListener::new()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let calls = provider.total_calls();

        tokio::time::sleep(Duration::from_secs(46)).await;

        assert_eq!(provider.total_calls(), calls + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_chart_uses_canonical_id() {
        let (engine, _) = engine();
        let spec = ChartSpec::new(["msft", "aapl"], "1y".parse().unwrap()).unwrap();
        let chart_id = engine.watch_chart(spec).unwrap();
        assert_eq!(chart_id, "MSFT,AAPL_1y");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(engine.get_chart(&chart_id).unwrap().result.is_comparison());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wildcard_listener_sees_updates_and_removals() {
        let (engine, _) = engine();
        let all = RecordingListener::new();
        engine.subscribe("*", all.clone()).unwrap();

        engine.subscribe("AAPL_1m", RecordingListener::new()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        engine.remove_chart("AAPL_1m");

        let events = all.events();
        assert_eq!(events.len(), 2);
        assert!(!events[0].is_removal());
        assert_eq!(
            events[1],
            ChartEvent::Removed {
                id: "AAPL_1m".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_chart_stops_refreshing_and_stays_removed() {
        let (engine, provider) = engine();
        engine.subscribe("AAPL_1m", RecordingListener::new()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        engine.remove_chart("AAPL_1m");
        let calls = provider.total_calls();
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(provider.total_calls(), calls);
        assert!(!engine.get_all_charts().contains_key("AAPL_1m"));
        assert_eq!(
            engine.subscription_state("AAPL_1m"),
            SubscriptionState::Removed
        );
        assert!(!engine.update_chart("AAPL_1m", single_payload("AAPL", dec!(1))).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_resubscribe_revives_removed_chart() {
        let (engine, _) = engine();
        engine.remove_chart("AAPL_1m");

        let listener = RecordingListener::new();
        engine.subscribe("AAPL_1m", listener.clone()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(listener.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_chart_id_is_listen_only() {
        let (engine, provider) = engine();
        let listener = RecordingListener::new();
        engine.subscribe("portfolio-performance", listener.clone()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(provider.total_calls(), 0);

        assert!(engine
            .update_chart("portfolio-performance", single_payload("PORT", dec!(1)))
            .unwrap());
        assert_eq!(listener.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_callback_can_remove_its_chart() {
        let (engine, _) = engine();
        let engine = Arc::new(engine);
        let weak = Arc::downgrade(&engine);
        let seen = Arc::new(Mutex::new(0usize));

        let counter = seen.clone();
        engine
            .subscribe("AAPL_1m", move |event: &ChartEvent| {
                *counter.lock().unwrap() += 1;
                if let Some(engine) = weak.upgrade() {
                    engine.remove_chart(event.id());
                }
            })
            .unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(
            engine.subscription_state("AAPL_1m"),
            SubscriptionState::Removed
        );
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_persisted_charts_replay_after_restart() {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        {
            let (engine, _) = engine_with(fast_config(), store.clone());
            engine.subscribe("AAPL_1m", RecordingListener::new()).unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
            engine.close();
        }

        let (restarted, provider) = engine_with(fast_config(), store);
        assert!(restarted.get_all_charts().contains_key("AAPL_1m"));

        let listener = RecordingListener::new();
        restarted.subscribe("AAPL_1m", listener.clone()).unwrap();
        assert_eq!(listener.len(), 1);
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_rejects_further_work() {
        let (engine, provider) = engine();
        engine.subscribe("AAPL_1m", RecordingListener::new()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let calls = provider.total_calls();

        engine.close();
        engine.close();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(engine.is_closed());
        assert_eq!(provider.total_calls(), calls);
        assert!(matches!(
            engine.subscribe("MSFT_1m", RecordingListener::new()),
            Err(Error::EngineClosed)
        ));
        assert!(matches!(
            engine.request_series("MSFT", "1m").await,
            Err(Error::EngineClosed)
        ));
        // Published charts stay readable
        assert!(engine.get_chart("AAPL_1m").is_some());
    }
}
