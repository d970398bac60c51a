//! Observation store: append-only `ticker_data` table on SQLite
//!
//! The schema is embedded from `/sql/` and applied idempotently at startup.
//! All SQL files use "IF NOT EXISTS" clauses.

use super::error::StoreError;
use super::sqlite_pragma::apply_pragmas;
use super::types::Observation;
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Schema migrations, applied in order
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("01_ticker_data.sql", include_str!("../../sql/01_ticker_data.sql")),
    ("02_daily_ohlcv.sql", include_str!("../../sql/02_daily_ohlcv.sql")),
    ("03_alert_events.sql", include_str!("../../sql/03_alert_events.sql")),
];

/// Durable append-only observation log
///
/// Tables written (see `/sql/`):
/// - `ticker_data` - INSERT only
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Create tables and indexes if absent. Safe to call on every startup.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Append one observation
    async fn append(&self, observation: &Observation) -> Result<(), StoreError>;
}

/// Open a tuned SQLite connection
///
/// Creates the parent directory when needed. Used by the store, the
/// refresher and the SQLite alert sink so each owns its own connection.
pub fn open_connection(db_path: impl AsRef<Path>) -> Result<Connection, StoreError> {
    let db_path = db_path.as_ref();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::ConnectionLost(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let conn = Connection::open(db_path)
        .map_err(|e| StoreError::ConnectionLost(format!("{}: {}", db_path.display(), e)))?;
    apply_pragmas(&conn)?;

    Ok(conn)
}

/// Run the embedded schema migrations on a connection
pub fn run_schema_migrations(conn: &Connection) -> Result<(), StoreError> {
    log::info!("🔧 Running schema migrations");

    for (filename, sql) in MIGRATIONS {
        log::info!("   ├─ Executing: {}", filename);
        conn.execute_batch(sql)
            .map_err(|e| StoreError::SchemaError(format!("{}: {}", filename, e)))?;
    }

    log::info!("✅ All schema migrations completed successfully");
    Ok(())
}

/// SQLite implementation of ObservationStore
///
/// Writes happen on the blocking pool so a slow disk or a held write lock
/// never stalls the async runtime; callers bound the wait with a timeout.
pub struct SqliteObservationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteObservationStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = open_connection(db_path)?;
        log::info!("✅ SQLite observation store opened (WAL mode)");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::ConnectionLost("connection mutex poisoned".to_string()))?;
            op(&*guard)
        })
        .await
        .map_err(|e| StoreError::WriteFailed(format!("store task failed: {}", e)))?
    }
}

#[async_trait]
impl ObservationStore for SqliteObservationStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.with_conn(run_schema_migrations).await
    }

    async fn append(&self, observation: &Observation) -> Result<(), StoreError> {
        let observation = observation.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO ticker_data (timestamp, symbol, price_usd, volume)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    observation.timestamp.timestamp_millis(),
                    observation.symbol,
                    observation.price,
                    observation.volume,
                ],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = SqliteObservationStore::open(dir.path().join("coinwatch.db")).unwrap();

        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();

        let conn = Connection::open(dir.path().join("coinwatch.db")).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN ('ticker_data', 'daily_ohlcv', 'alert_events')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[tokio::test]
    async fn test_append_observation() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("coinwatch.db");
        let store = SqliteObservationStore::open(&db_path).unwrap();
        store.ensure_schema().await.unwrap();

        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        store
            .append(&Observation::new(ts, "BTC", 64_000.5, 1_250.0))
            .await
            .unwrap();
        store
            .append(&Observation::new(ts, "ETH", 3_400.0, 900.0))
            .await
            .unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let (timestamp, price, volume): (i64, f64, f64) = conn
            .query_row(
                "SELECT timestamp, price_usd, volume FROM ticker_data WHERE symbol = ?1",
                ["BTC"],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();

        assert_eq!(timestamp, ts.timestamp_millis());
        assert_eq!(price, 64_000.5);
        assert_eq!(volume, 1_250.0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM ticker_data", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_repeated_append_stores_one_row() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("coinwatch.db");
        let store = SqliteObservationStore::open(&db_path).unwrap();
        store.ensure_schema().await.unwrap();

        let observation = Observation::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(), "BTC", 64_000.0, 10.0);
        store.append(&observation).await.unwrap();
        store.append(&observation).await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM ticker_data", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_append_without_schema_fails() {
        let dir = tempdir().unwrap();
        let store = SqliteObservationStore::open(dir.path().join("empty.db")).unwrap();

        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let result = store.append(&Observation::new(ts, "BTC", 1.0, 1.0)).await;

        assert!(matches!(result, Err(StoreError::WriteFailed(_))));
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("data").join("nested").join("coinwatch.db");

        let _store = SqliteObservationStore::open(&nested).unwrap();
        assert!(nested.exists());
    }
}
