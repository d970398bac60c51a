//! Error taxonomy for the ingestion loop, store, sink and configuration

use rusqlite::ErrorCode;
use thiserror::Error;

/// Failure of a whole fetch call
///
/// Partial batches (one symbol missing) are not errors; they are filtered
/// by the fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP 429 from the price source
    #[error("rate limited by price source: {0}")]
    RateLimited(String),

    /// Network failure, timeout or 5xx; retrying soon is expected to help
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// Anything else (other 4xx, malformed body)
    #[error("unexpected fetch failure: {0}")]
    Unexpected(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::RateLimited(_) => "rate_limited",
            FetchError::Transient(_) => "transient",
            FetchError::Unexpected(_) => "unexpected",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return classify_status(status.as_u16(), err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            FetchError::Transient(err.to_string())
        } else {
            FetchError::Unexpected(err.to_string())
        }
    }
}

/// Map an HTTP status code to a fetch error kind
///
/// 429 is rate limiting; 408 and 5xx are worth a quick retry; other codes
/// are unexpected.
pub fn classify_status(status: u16, detail: String) -> FetchError {
    match status {
        429 => FetchError::RateLimited(detail),
        408 | 500..=599 => FetchError::Transient(detail),
        _ => FetchError::Unexpected(detail),
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection lost: {0}")]
    ConnectionLost(String),

    #[error("store write failed: {0}")]
    WriteFailed(String),

    #[error("store schema error: {0}")]
    SchemaError(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::CannotOpen)
            | Some(ErrorCode::NotADatabase)
            | Some(ErrorCode::DatabaseCorrupt)
            | Some(ErrorCode::SystemIoFailure) => StoreError::ConnectionLost(err.to_string()),
            _ => StoreError::WriteFailed(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("alert sink write failed: {0}")]
    WriteFailed(String),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::WriteFailed(err.to_string())
    }
}

impl From<rusqlite::Error> for SinkError {
    fn from(err: rusqlite::Error) -> Self {
        SinkError::WriteFailed(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    MissingVariable(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
