//! Core data types shared across the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One price/volume sample for a symbol
///
/// Immutable once created. Appended to `ticker_data` and fed to the
/// rolling window tracker; never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, symbol: impl Into<String>, price: f64, volume: f64) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            price,
            volume,
        }
    }
}

/// Which metric an alert fired on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    Price,
    Volume,
}

impl AlertKind {
    /// Label used in the alert line ("Price Alert: ...")
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Price => "Price",
            AlertKind::Volume => "Volume",
        }
    }

    /// Metric name used inside the message ("... BTC price changed ...")
    pub fn metric(&self) -> &'static str {
        match self {
            AlertKind::Price => "price",
            AlertKind::Volume => "volume",
        }
    }
}

/// Threshold breach raised by the alert evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub kind: AlertKind,
    pub observed_change_pct: f64,
    pub message: String,
}

impl AlertEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        symbol: impl Into<String>,
        kind: AlertKind,
        observed_change_pct: f64,
    ) -> Self {
        let symbol = symbol.into();
        let message = format!(
            "{} Alert: {} {} changed by {:.2}% from the previous average.",
            kind.as_str(),
            symbol,
            kind.metric(),
            observed_change_pct
        );

        Self {
            timestamp,
            symbol,
            kind,
            observed_change_pct,
            message,
        }
    }

    /// Render the event as one line of the append-only alert log
    ///
    /// Format: `2024-03-01 12:05:00 UTC: Price Alert: BTC price changed by 3.00% from the previous average.`
    pub fn to_line(&self) -> String {
        format!(
            "{} UTC: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.message
        )
    }
}

/// One row of the derived `daily_ohlcv` aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub symbol: String,
    /// UTC calendar day, `YYYY-MM-DD`
    pub day: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume_sum: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_alert_line_format() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap();
        let event = AlertEvent::new(ts, "BTC", AlertKind::Price, 3.0);

        assert_eq!(
            event.to_line(),
            "2024-03-01 12:05:00 UTC: Price Alert: BTC price changed by 3.00% from the previous average."
        );
    }

    #[test]
    fn test_volume_message_uses_metric_name() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let event = AlertEvent::new(ts, "ETH", AlertKind::Volume, 12.345);

        assert_eq!(
            event.message,
            "Volume Alert: ETH volume changed by 12.35% from the previous average."
        );
    }
}
