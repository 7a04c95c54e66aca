use chartsync_watcher::config::Config;
use chartsync_watcher::{build_engine, init_tracing, log_event};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(&config.log_format);

    let engine = build_engine(&config)?;

    let mut handles = Vec::with_capacity(config.charts.len());
    for chart_id in &config.charts {
        handles.push(engine.subscribe(chart_id, log_event)?);
        tracing::info!("Watching {}", chart_id);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    for handle in handles {
        handle.unsubscribe();
    }
    engine.close();
    Ok(())
}
