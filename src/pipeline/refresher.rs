//! Daily OHLCV aggregate refresher
//!
//! Background task that rebuilds `daily_ohlcv` from `ticker_data` on its own
//! timer, independent of the ingestion tick.
//!
//! State machine: `Idle -> Refreshing -> Idle`, forever. A failed refresh is
//! logged and the task waits for the next tick; the aggregate just goes
//! stale.
//!
//! The refresher owns a dedicated connection, so nothing it does takes the
//! ingestion store's mutex. Each refresh has two phases:
//! 1. Compute rows inside a read transaction (WAL snapshot; does not block
//!    the ingestion writer)
//! 2. Upsert them on `(symbol, day)` in one short write transaction
//!
//! Readers of `daily_ohlcv` therefore see either the previous or the new
//! complete state, never a half-written one.

use super::db::open_connection;
use super::error::StoreError;
use super::types::AggregateRow;
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use std::path::{Path, PathBuf};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// open = price of the earliest sample of the day, close = price of the
/// latest.
const COMPUTE_DAILY_OHLCV_SQL: &str = r#"
    WITH bucketed AS (
        SELECT
            symbol,
            date(timestamp / 1000, 'unixepoch') AS day,
            price_usd,
            volume,
            FIRST_VALUE(price_usd) OVER (
                PARTITION BY symbol, date(timestamp / 1000, 'unixepoch')
                ORDER BY timestamp ASC, id ASC
            ) AS open,
            FIRST_VALUE(price_usd) OVER (
                PARTITION BY symbol, date(timestamp / 1000, 'unixepoch')
                ORDER BY timestamp DESC, id DESC
            ) AS close
        FROM ticker_data
    )
    SELECT
        symbol,
        day,
        MAX(open),
        MAX(price_usd),
        MIN(price_usd),
        MAX(close),
        SUM(volume)
    FROM bucketed
    GROUP BY symbol, day
    ORDER BY symbol, day
"#;

const UPSERT_DAILY_OHLCV_SQL: &str = r#"
    INSERT INTO daily_ohlcv (symbol, day, open, high, low, close, volume_sum, refreshed_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(symbol, day) DO UPDATE SET
        open = excluded.open,
        high = excluded.high,
        low = excluded.low,
        close = excluded.close,
        volume_sum = excluded.volume_sum,
        refreshed_at = excluded.refreshed_at
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// Summary of one completed refresh
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub rows: usize,
    pub duration: Duration,
}

pub struct AggregateRefresher {
    db_path: PathBuf,
    /// `None` while a refresh is running on the blocking pool, or after
    /// that task was lost; reopened on the next refresh.
    conn: Option<Connection>,
    state: RefreshState,
    consecutive_failures: u32,
}

impl AggregateRefresher {
    /// Open the refresher's own connection to the store
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        let conn = open_connection(&db_path)?;
        Ok(Self {
            db_path,
            conn: Some(conn),
            state: RefreshState::Idle,
            consecutive_failures: 0,
        })
    }

    pub fn state(&self) -> RefreshState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run a single refresh: `Idle -> Refreshing -> Idle`
    pub async fn refresh_once(&mut self) -> Result<RefreshReport, StoreError> {
        self.state = RefreshState::Refreshing;
        let started = std::time::Instant::now();

        let result = self.refresh_on_blocking_pool().await;

        self.state = RefreshState::Idle;

        match result {
            Ok(rows) => {
                self.consecutive_failures = 0;
                Ok(RefreshReport {
                    rows,
                    duration: started.elapsed(),
                })
            }
            Err(e) => {
                self.consecutive_failures += 1;
                Err(e)
            }
        }
    }

    async fn refresh_on_blocking_pool(&mut self) -> Result<usize, StoreError> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => open_connection(&self.db_path)?,
        };

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = refresh_daily_ohlcv(&mut conn);
            (conn, result)
        })
        .await
        .map_err(|e| StoreError::ConnectionLost(format!("refresh task failed: {}", e)))?;

        self.conn = Some(conn);
        result
    }

    /// Refresh forever on a fixed timer
    ///
    /// Never returns. Failures are logged and retried at the regular
    /// cadence; they never reach the ingestion loop.
    pub async fn run(&mut self, refresh_interval: Duration) {
        log::info!(
            "⏰ Starting daily_ohlcv refresher (interval: {}s)",
            refresh_interval.as_secs()
        );

        let mut timer = interval(refresh_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;

            match self.refresh_once().await {
                Ok(report) => {
                    log::info!(
                        "✅ daily_ohlcv refreshed: {} rows in {}ms",
                        report.rows,
                        report.duration.as_millis()
                    );
                }
                Err(e) => {
                    log::error!(
                        "❌ Error refreshing daily_ohlcv ({} consecutive): {}",
                        self.consecutive_failures,
                        e
                    );
                }
            }
        }
    }
}

/// Recompute every (symbol, day) bucket and upsert it
///
/// Returns the number of rows written.
pub fn refresh_daily_ohlcv(conn: &mut Connection) -> Result<usize, StoreError> {
    // Phase 1: read snapshot
    let rows = {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let rows = compute_daily_ohlcv(&tx)?;
        tx.commit()?;
        rows
    };

    // Phase 2: short write
    let refreshed_at = Utc::now().timestamp();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    {
        let mut stmt = tx.prepare_cached(UPSERT_DAILY_OHLCV_SQL)?;
        for row in &rows {
            stmt.execute(rusqlite::params![
                row.symbol,
                row.day,
                row.open,
                row.high,
                row.low,
                row.close,
                row.volume_sum,
                refreshed_at,
            ])?;
        }
    }
    tx.commit()?;

    Ok(rows.len())
}

fn compute_daily_ohlcv(conn: &Connection) -> Result<Vec<AggregateRow>, StoreError> {
    let mut stmt = conn.prepare(COMPUTE_DAILY_OHLCV_SQL)?;
    let rows = stmt
        .query_map([], row_to_aggregate)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn row_to_aggregate(row: &rusqlite::Row<'_>) -> rusqlite::Result<AggregateRow> {
    Ok(AggregateRow {
        symbol: row.get(0)?,
        day: row.get(1)?,
        open: row.get(2)?,
        high: row.get(3)?,
        low: row.get(4)?,
        close: row.get(5)?,
        volume_sum: row.get(6)?,
    })
}

/// Read the aggregate rows for one symbol, oldest day first
pub fn load_daily_ohlcv(conn: &Connection, symbol: &str) -> Result<Vec<AggregateRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT symbol, day, open, high, low, close, volume_sum
         FROM daily_ohlcv
         WHERE symbol = ?1
         ORDER BY day ASC",
    )?;
    let rows = stmt
        .query_map([symbol], row_to_aggregate)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
