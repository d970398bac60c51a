//! Coinwatch Runtime
//!
//! Runs the two long-lived activities of the pipeline:
//! - Ingestion loop: fetch market data, store it, update rolling windows,
//!   and raise threshold alerts on a wall-clock schedule
//! - Aggregate refresher: keep `daily_ohlcv` fresh on its own connection
//!
//! Usage:
//!   cargo run --release --bin coinwatch
//!
//! Environment variables (see `PipelineConfig::from_env` for the full list):
//!   COINWATCH_DB_PATH - SQLite database path (default: coinwatch.db)
//!   ALERT_THRESHOLD_PCT - Alert threshold in percent (default: 2.0)
//!   ALERT_SINK - `file` or `sqlite` (default: file)
//!   RUST_LOG - Log filter (default: info)

use chrono::Utc;
use coinwatch::pipeline::{
    coingecko::{CoinGeckoFetcher, MarketFetcher},
    config::{PipelineConfig, SinkBackend},
    db::{ObservationStore, SqliteObservationStore},
    ingestion::IngestionLoop,
    refresher::AggregateRefresher,
    sink::{AlertSink, FileAlertSink, SqliteAlertSink},
};
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Coinwatch Runtime");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    // Invalid configuration is fatal
    let config = PipelineConfig::from_env()?;

    info!("✅ Configuration loaded");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Coins: {}", config.coin_ids.join(","));
    info!("   ├─ Tracked symbols: {}", config.tracked_symbols.join(","));
    info!("   ├─ Alert threshold: {}%", config.alert_threshold_pct);
    info!("   ├─ Window: {}s, alert interval: {}s", config.window_secs, config.alert_interval_secs);
    info!("   ├─ Fetch interval: {}ms", config.fetch_interval_ms);
    info!("   ├─ Refresh interval: {}s", config.refresh_interval_secs);
    info!("   └─ Alert sink: {:?}", config.alert_sink);

    // Initialize database (schema failure is fatal)
    info!("🔧 Initializing database...");
    let store = Arc::new(SqliteObservationStore::open(&config.db_path)?);
    store.ensure_schema().await?;
    let store: Arc<dyn ObservationStore> = store;
    info!("✅ Database initialized");

    let sink: Arc<dyn AlertSink> = match config.alert_sink {
        SinkBackend::File => Arc::new(FileAlertSink::open(&config.alerts_path)?),
        SinkBackend::Sqlite => Arc::new(SqliteAlertSink::open(&config.db_path)?),
    };
    info!("✅ Alert sink ready ({})", sink.backend_type());

    let fetcher: Arc<dyn MarketFetcher> = Arc::new(CoinGeckoFetcher::new(&config)?);

    // Spawn background tasks
    info!("🚀 Spawning background tasks...");

    // Task 1: Aggregate refresher (own connection, own interval)
    let mut refresher = AggregateRefresher::open(&config.db_path)?;
    let refresh_interval = config.refresh_interval();
    let refresher_handle = tokio::spawn(async move {
        refresher.run(refresh_interval).await;
    });
    info!("   ├─ ✅ Aggregate refresher spawned");

    // Task 2: Ingestion loop
    let ingestion = IngestionLoop::from_config(&config, fetcher, store, sink, Utc::now());
    let ingestion_handle = tokio::spawn(async move {
        ingestion.run().await;
    });
    info!("   └─ ✅ Ingestion loop spawned");

    info!("");
    info!("🔄 Press CTRL+C to shutdown");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => {
                    info!("");
                    info!("⚠️  Received CTRL+C, shutting down...");
                }
                Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
            }
        }
        result = ingestion_handle => {
            error!("❌ Ingestion loop exited unexpectedly: {:?}", result);
        }
    }

    refresher_handle.abort();

    info!("✅ Coinwatch runtime stopped");
    Ok(())
}
