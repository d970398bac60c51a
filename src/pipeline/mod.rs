//! # Market Data Pipeline
//!
//! Polls a market data API, persists every observation to SQLite, keeps a
//! rolling window per symbol in memory, and raises threshold alerts on a
//! wall-clock schedule. A separate task keeps the `daily_ohlcv` aggregate
//! fresh from the raw table.
//!
//! ## Architecture
//!
//! Two independent activities share nothing but the database file:
//!
//! 1. **Ingestion loop** (`ingestion`): fetch -> store -> window -> alert
//!    check -> sleep, at a fixed cadence. Owns the rolling windows.
//! 2. **Aggregate refresher** (`refresher`): recomputes daily OHLCV rows
//!    on its own connection and interval. A failed refresh is logged and
//!    retried next interval; it never touches the ingestion loop.
//!
//! ## Schema Reference
//!
//! Migrations live in `/sql/` and are embedded at compile time:
//! - `ticker_data` → `Observation`
//! - `daily_ohlcv` → `AggregateRow`
//! - `alert_events` → `AlertEvent` (sqlite sink only)
//!
//! ## Module Organization
//!
//! - `types` - Observation, AlertEvent, AggregateRow
//! - `error` - Fetch/store/sink/config error kinds
//! - `config` - Environment-driven runtime configuration
//! - `coingecko` - `MarketFetcher` trait and the CoinGecko client
//! - `db` - Connection setup, migrations, `ObservationStore`
//! - `windows` - Per-symbol rolling windows
//! - `alerts` - Threshold evaluation over a window
//! - `sink` - `AlertSink` trait with file and SQLite backends
//! - `ingestion` - Loop driver and alert schedule
//! - `refresher` - Daily OHLCV aggregate refresh

pub mod types;
pub mod error;
pub mod config;
pub mod sqlite_pragma;
pub mod retry;
pub mod coingecko;
pub mod db;
pub mod windows;
pub mod alerts;
pub mod sink;
pub mod ingestion;
pub mod refresher;

// Re-export commonly used types
pub use types::{AggregateRow, AlertEvent, AlertKind, Observation};
pub use error::{ConfigError, FetchError, SinkError, StoreError};
pub use config::{PipelineConfig, SinkBackend};
pub use coingecko::{CoinGeckoFetcher, MarketFetcher};
pub use db::{ObservationStore, SqliteObservationStore};
pub use windows::RollingWindowTracker;
pub use alerts::AlertEvaluator;
pub use sink::{AlertSink, FileAlertSink, SqliteAlertSink};
pub use ingestion::{AlertSchedule, IngestionLoop, LoopSettings, TickOutcome};
pub use refresher::AggregateRefresher;
