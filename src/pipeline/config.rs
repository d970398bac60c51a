//! Pipeline configuration from environment variables

use super::error::ConfigError;
use std::env;
use std::time::Duration;

/// Where alert events are persisted
#[derive(Debug, Clone, PartialEq)]
pub enum SinkBackend {
    File,
    Sqlite,
}

impl SinkBackend {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_lowercase().as_str() {
            "file" => Ok(SinkBackend::File),
            "sqlite" => Ok(SinkBackend::Sqlite),
            other => Err(ConfigError::InvalidValue(format!(
                "ALERT_SINK must be 'file' or 'sqlite', got '{}'",
                other
            ))),
        }
    }
}

/// Configuration for the coinwatch runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// CoinGecko markets endpoint
    pub api_url: String,

    /// CoinGecko coin ids requested on every fetch
    pub coin_ids: Vec<String>,

    /// Uppercased symbols evaluated on each alert check, even before data arrives
    pub tracked_symbols: Vec<String>,

    pub vs_currency: String,

    /// Percentage deviation from the window average that raises an alert
    pub alert_threshold_pct: f64,

    pub window_secs: u64,
    pub alert_interval_secs: u64,
    pub refresh_interval_secs: u64,

    /// Target fetch cadence in milliseconds
    pub fetch_interval_ms: u64,

    pub rate_limit_backoff_secs: u64,
    pub error_backoff_secs: u64,

    pub fetch_timeout_ms: u64,
    pub store_timeout_ms: u64,

    /// Extra attempts for a failed observation insert
    pub store_retry_attempts: u32,

    pub alert_sink: SinkBackend,
    pub alerts_path: String,
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `COINWATCH_DB_PATH` (default: coinwatch.db)
    /// - `COINGECKO_API_URL` (default: https://api.coingecko.com/api/v3/coins/markets)
    /// - `COIN_IDS` (default: bitcoin,ethereum,zcash)
    /// - `TRACKED_SYMBOLS` (default: BTC,ETH,ZEC)
    /// - `VS_CURRENCY` (default: usd)
    /// - `ALERT_THRESHOLD_PCT` (default: 2.0)
    /// - `WINDOW_DURATION_SECS` (default: 300)
    /// - `ALERT_INTERVAL_SECS` (default: 300)
    /// - `REFRESH_INTERVAL_SECS` (default: 60)
    /// - `FETCH_INTERVAL_MS` (default: 1000)
    /// - `RATE_LIMIT_BACKOFF_SECS` (default: 60)
    /// - `ERROR_BACKOFF_SECS` (default: 5)
    /// - `FETCH_TIMEOUT_MS` (default: 10000)
    /// - `STORE_TIMEOUT_MS` (default: 5000)
    /// - `STORE_RETRY_ATTEMPTS` (default: 2)
    /// - `ALERT_SINK` (default: file)
    /// - `ALERTS_PATH` (default: alerts/alerts.txt)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let list_or = |key: &str, default: &str| -> Vec<String> {
            string_or(key, default)
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let config = Self {
            db_path: string_or("COINWATCH_DB_PATH", "coinwatch.db"),
            api_url: string_or(
                "COINGECKO_API_URL",
                "https://api.coingecko.com/api/v3/coins/markets",
            ),
            coin_ids: list_or("COIN_IDS", "bitcoin,ethereum,zcash"),
            tracked_symbols: list_or("TRACKED_SYMBOLS", "BTC,ETH,ZEC")
                .into_iter()
                .map(|s| s.to_uppercase())
                .collect(),
            vs_currency: string_or("VS_CURRENCY", "usd"),
            alert_threshold_pct: parse_or(&lookup, "ALERT_THRESHOLD_PCT", 2.0)?,
            window_secs: parse_or(&lookup, "WINDOW_DURATION_SECS", 300)?,
            alert_interval_secs: parse_or(&lookup, "ALERT_INTERVAL_SECS", 300)?,
            refresh_interval_secs: parse_or(&lookup, "REFRESH_INTERVAL_SECS", 60)?,
            fetch_interval_ms: parse_or(&lookup, "FETCH_INTERVAL_MS", 1_000)?,
            rate_limit_backoff_secs: parse_or(&lookup, "RATE_LIMIT_BACKOFF_SECS", 60)?,
            error_backoff_secs: parse_or(&lookup, "ERROR_BACKOFF_SECS", 5)?,
            fetch_timeout_ms: parse_or(&lookup, "FETCH_TIMEOUT_MS", 10_000)?,
            store_timeout_ms: parse_or(&lookup, "STORE_TIMEOUT_MS", 5_000)?,
            store_retry_attempts: parse_or(&lookup, "STORE_RETRY_ATTEMPTS", 2)?,
            alert_sink: SinkBackend::parse(&string_or("ALERT_SINK", "file"))?,
            alerts_path: string_or("ALERTS_PATH", "alerts/alerts.txt"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.alert_threshold_pct.is_finite() && self.alert_threshold_pct > 0.0) {
            return Err(ConfigError::InvalidValue(format!(
                "ALERT_THRESHOLD_PCT must be a positive number, got {}",
                self.alert_threshold_pct
            )));
        }

        if self.coin_ids.is_empty() {
            return Err(ConfigError::MissingVariable("COIN_IDS".to_string()));
        }

        if self.db_path.trim().is_empty() {
            return Err(ConfigError::MissingVariable("COINWATCH_DB_PATH".to_string()));
        }

        let intervals = [
            ("WINDOW_DURATION_SECS", self.window_secs),
            ("ALERT_INTERVAL_SECS", self.alert_interval_secs),
            ("REFRESH_INTERVAL_SECS", self.refresh_interval_secs),
            ("FETCH_INTERVAL_MS", self.fetch_interval_ms),
            ("FETCH_TIMEOUT_MS", self.fetch_timeout_ms),
            ("STORE_TIMEOUT_MS", self.store_timeout_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!("{} must be greater than 0", name)));
            }
        }

        Ok(())
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn window_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_secs as i64)
    }

    pub fn alert_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.alert_interval_secs as i64)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}='{}' could not be parsed", key, raw))),
        None => Ok(default),
    }
}
