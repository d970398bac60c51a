//! coinwatch: market data ingestion, rolling-window alerts and a daily
//! OHLCV aggregate, all backed by a single SQLite file.

pub mod pipeline;
