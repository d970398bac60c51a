//! Alert sinks: durable append-only alert records
//!
//! Two backends, chosen with `ALERT_SINK`:
//! - `file`: one text line per alert, synced to disk on every write
//! - `sqlite`: one row per alert in `alert_events`
//!
//! Both do their I/O on the blocking pool; the caller bounds the wait.

use super::db::open_connection;
use super::error::SinkError;
use super::types::AlertEvent;
use async_trait::async_trait;
use rusqlite::Connection;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Backend trait for persisting alert events
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Append a single alert event
    async fn append(&self, event: &AlertEvent) -> Result<(), SinkError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// Run `op` against a shared handle on the blocking pool
async fn with_blocking<H, F>(handle: &Arc<Mutex<H>>, op: F) -> Result<(), SinkError>
where
    H: Send + 'static,
    F: FnOnce(&mut H) -> Result<(), SinkError> + Send + 'static,
{
    let handle = Arc::clone(handle);

    tokio::task::spawn_blocking(move || {
        let mut guard = handle
            .lock()
            .map_err(|_| SinkError::WriteFailed("alert sink mutex poisoned".to_string()))?;
        op(&mut *guard)
    })
    .await
    .map_err(|e| SinkError::WriteFailed(format!("alert write task failed: {}", e)))?
}

/// Append-only text file sink
pub struct FileAlertSink {
    file: Arc<Mutex<File>>,
}

impl FileAlertSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::info!("📝 Writing alerts to: {}", path.display());

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

#[async_trait]
impl AlertSink for FileAlertSink {
    async fn append(&self, event: &AlertEvent) -> Result<(), SinkError> {
        let line = event.to_line();

        with_blocking(&self.file, move |file| {
            writeln!(file, "{}", line)?;
            file.sync_data()?;
            Ok(())
        })
        .await
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}

/// Alert sink backed by the `alert_events` table
///
/// Owns its own connection; the table comes from the shared schema
/// migrations.
pub struct SqliteAlertSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAlertSink {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let conn = open_connection(db_path).map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl AlertSink for SqliteAlertSink {
    async fn append(&self, event: &AlertEvent) -> Result<(), SinkError> {
        let event = event.clone();

        with_blocking(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO alert_events (timestamp, symbol, kind, change_pct, message)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    event.timestamp.timestamp_millis(),
                    event.symbol,
                    event.kind.as_str(),
                    event.observed_change_pct,
                    event.message,
                ],
            )?;
            Ok(())
        })
        .await
    }

    fn backend_type(&self) -> &'static str {
        "sqlite"
    }
}
