//! Candle store
//!
//! Durable keyed storage for candles with idempotent batch upserts, watermark
//! lookups and range queries. One [`CandleStore`] implementation exists per
//! backend; [`open_store`] picks it once from configuration.

mod postgres;
pub mod retry;
mod sqlite;

pub use postgres::PostgresCandleStore;
pub use retry::{with_retry, RetryPolicy};
pub use sqlite::SqliteCandleStore;

use crate::candle::{parse_timestamp, Candle, Interval};
use crate::config::{Backend, StorageConfig};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use sqlx::sqlite::SqliteError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by the database driver
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Contention did not clear within the retry budget
    #[error("storage still busy after {attempts} attempts: {source}")]
    ContentionExhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
    /// A record in an upsert batch is structurally invalid
    #[error("invalid candle record: {0}")]
    InvalidRecord(String),
    /// A stored timestamp could not be parsed
    #[error("unparsable {column} timestamp in store: {value:?}")]
    Timestamp { column: &'static str, value: String },
    /// A stored interval is not a known granularity
    #[error("unknown interval in store: {0:?}")]
    Interval(String),
    /// Operation not available on this backend
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the error is lock/connection contention worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(err) => is_contention(err),
            _ => false,
        }
    }

    fn into_exhausted(self, attempts: u32) -> Self {
        match self {
            StoreError::Database(source) => StoreError::ContentionExhausted { attempts, source },
            other => other,
        }
    }
}

/// SQLite primary result codes for a busy or locked database
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Postgres SQLSTATEs that clear up on retry
const PG_RETRYABLE: [&str; 4] = [
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
    "57P03", // cannot_connect_now
];

fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => {
            let code = db.code().unwrap_or_default();
            let code: &str = &code;
            if db.try_downcast_ref::<SqliteError>().is_some() {
                sqlite_code_is_busy(code) || db.message().contains("database is locked")
            } else {
                PG_RETRYABLE.contains(&code)
            }
        }
        _ => false,
    }
}

/// SQLite reports extended codes; the primary code is the low byte
fn sqlite_code_is_busy(code: &str) -> bool {
    code.parse::<i32>()
        .is_ok_and(|extended| matches!(extended & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

/// Capabilities every candle storage backend provides
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Backend this store talks to
    fn backend(&self) -> Backend;

    /// Create the `symbols` and `candles` tables if they do not exist
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Create the query indexes if they do not exist
    async fn ensure_indexed(&self) -> Result<(), StoreError>;

    /// Record a symbol in the `symbols` table; existing rows are left alone
    async fn register_symbol(
        &self,
        symbol_id: i64,
        symbol: &str,
        description: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Insert or replace candles keyed by `(symbol, interval, start)`.
    ///
    /// The batch is atomic: if any record is invalid or fails to write,
    /// nothing is persisted. Returns the number of rows written.
    async fn upsert_candles(&self, candles: &[Candle]) -> Result<usize, StoreError>;

    /// Greatest persisted `end` for the series, `None` if it has no rows
    async fn latest_period_end(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Option<DateTime<FixedOffset>>, StoreError>;

    /// Candles with `start <= candle.start <= end`, ascending by start
    async fn query_range(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<Candle>, StoreError>;

    /// Close of the most recent candle (by start) across all intervals
    async fn latest_close(&self, symbol: &str) -> Result<Option<f64>, StoreError>;

    /// Every candle, ordered by `(symbol, interval, start)`
    async fn load_all(&self) -> Result<Vec<Candle>, StoreError>;

    /// Write a point-in-time copy of the store into `dir`
    async fn backup(&self, dir: &Path, date: NaiveDate) -> Result<PathBuf, StoreError>;
}

/// Open the store selected by configuration
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn CandleStore>, StoreError> {
    let policy = RetryPolicy::from_config(config);
    let store: Arc<dyn CandleStore> = match config.backend {
        Backend::Sqlite => Arc::new(
            SqliteCandleStore::open(&config.sqlite_path, policy, config.max_connections).await?,
        ),
        Backend::Postgres => Arc::new(PostgresCandleStore::connect(
            &config.postgres,
            policy,
            config.max_connections,
        )?),
    };
    tracing::debug!(backend = ?config.backend, "Candle store opened");
    Ok(store)
}

/// Column list shared by every candle SELECT
pub(crate) const CANDLE_COLUMNS: &str =
    r#"symbol, "interval", start, "end", open, high, low, close, volume, vwap"#;

/// Raw `candles` row as stored (text timestamps and interval)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CandleRow {
    symbol: String,
    interval: String,
    start: String,
    end: Option<String>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<i64>,
    vwap: Option<f64>,
}

impl TryFrom<CandleRow> for Candle {
    type Error = StoreError;

    fn try_from(row: CandleRow) -> Result<Self, Self::Error> {
        let interval = row
            .interval
            .parse::<Interval>()
            .map_err(|_| StoreError::Interval(row.interval.clone()))?;
        let start = decode_timestamp("start", &row.start)?;
        let end = row
            .end
            .as_deref()
            .map(|value| decode_timestamp("end", value))
            .transpose()?;

        Ok(Candle {
            symbol: row.symbol,
            interval,
            start,
            end,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            vwap: row.vwap,
        })
    }
}

pub(crate) fn decode_timestamp(
    column: &'static str,
    value: &str,
) -> Result<DateTime<FixedOffset>, StoreError> {
    parse_timestamp(value).map_err(|_| StoreError::Timestamp {
        column,
        value: value.to_string(),
    })
}

pub(crate) fn decode_rows(rows: Vec<CandleRow>) -> Result<Vec<Candle>, StoreError> {
    rows.into_iter().map(Candle::try_from).collect()
}

/// Reject the batch up front if any record is structurally invalid
pub(crate) fn validate_batch(candles: &[Candle]) -> Result<(), StoreError> {
    for candle in candles {
        candle.validate().map_err(StoreError::InvalidRecord)?;
    }
    Ok(())
}

/// Backup file name for a given day, e.g. `candles_backup_20240101.db`
pub fn backup_file_name(date: NaiveDate) -> String {
    format!("candles_backup_{}.db", date.format("%Y%m%d"))
}
