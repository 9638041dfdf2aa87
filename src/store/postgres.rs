//! PostgreSQL (networked) candle store

use super::{
    decode_rows, validate_batch, with_retry, CandleRow, CandleStore, RetryPolicy, StoreError,
    CANDLE_COLUMNS,
};
use crate::candle::{format_storage_timestamp, Candle, Interval};
use crate::config::{Backend, PostgresConfig};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const CREATE_SYMBOLS: &str = r#"
    CREATE TABLE IF NOT EXISTS symbols (
        symbol_id BIGINT PRIMARY KEY,
        symbol TEXT UNIQUE NOT NULL,
        description TEXT
    )
"#;

const CREATE_CANDLES: &str = r#"
    CREATE TABLE IF NOT EXISTS candles (
        id BIGSERIAL PRIMARY KEY,
        symbol TEXT NOT NULL,
        "interval" TEXT NOT NULL,
        start TEXT COLLATE "C" NOT NULL,
        "end" TEXT COLLATE "C",
        open DOUBLE PRECISION,
        high DOUBLE PRECISION,
        low DOUBLE PRECISION,
        close DOUBLE PRECISION,
        volume BIGINT,
        vwap DOUBLE PRECISION,
        UNIQUE(symbol, "interval", start)
    )
"#;

const CREATE_INDEXES: [&str; 2] = [
    r#"CREATE INDEX IF NOT EXISTS idx_candles_time ON candles(symbol, "interval", start)"#,
    "CREATE INDEX IF NOT EXISTS idx_candles_symbol ON candles(symbol)",
];

const UPSERT_CANDLE: &str = r#"
    INSERT INTO candles (symbol, "interval", start, "end", open, high, low, close, volume, vwap)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (symbol, "interval", start) DO UPDATE SET
        "end" = EXCLUDED."end",
        open = EXCLUDED.open,
        high = EXCLUDED.high,
        low = EXCLUDED.low,
        close = EXCLUDED.close,
        volume = EXCLUDED.volume,
        vwap = EXCLUDED.vwap
"#;

/// Candle store on a PostgreSQL server
#[derive(Debug, Clone)]
pub struct PostgresCandleStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PostgresCandleStore {
    /// Build a lazily-connecting pool; the first operation opens the
    /// connection (and goes through the retry policy).
    pub fn connect(
        config: &PostgresConfig,
        retry: RetryPolicy,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        let options = match &config.url {
            Some(url) => PgConnectOptions::from_str(url)?,
            None => PgConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .database(&config.database)
                .username(&config.user)
                .password(&config.password),
        };

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_lazy_with(options);

        tracing::info!(
            host = %config.host,
            database = %config.database,
            "Configured PostgreSQL candle store"
        );

        Ok(Self { pool, retry })
    }
}

#[async_trait]
impl CandleStore for PostgresCandleStore {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let pool = &self.pool;
        with_retry(&self.retry, "ensure_schema", move || async move {
            let mut conn = pool.acquire().await?;
            sqlx::query(CREATE_SYMBOLS).execute(&mut *conn).await?;
            sqlx::query(CREATE_CANDLES).execute(&mut *conn).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn ensure_indexed(&self) -> Result<(), StoreError> {
        let pool = &self.pool;
        with_retry(&self.retry, "ensure_indexed", move || async move {
            let mut conn = pool.acquire().await?;
            for statement in CREATE_INDEXES {
                sqlx::query(statement).execute(&mut *conn).await?;
            }
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn register_symbol(
        &self,
        symbol_id: i64,
        symbol: &str,
        description: Option<&str>,
    ) -> Result<(), StoreError> {
        let pool = &self.pool;
        with_retry(&self.retry, "register_symbol", move || async move {
            sqlx::query(
                "INSERT INTO symbols (symbol_id, symbol, description) VALUES ($1, $2, $3) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(symbol_id)
            .bind(symbol)
            .bind(description)
            .execute(pool)
            .await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn upsert_candles(&self, candles: &[Candle]) -> Result<usize, StoreError> {
        if candles.is_empty() {
            return Ok(0);
        }
        validate_batch(candles)?;

        let pool = &self.pool;
        let written = with_retry(&self.retry, "upsert_candles", move || async move {
            let mut tx = pool.begin().await?;
            for candle in candles {
                let result = sqlx::query(UPSERT_CANDLE)
                    .bind(&candle.symbol)
                    .bind(candle.interval.as_str())
                    .bind(format_storage_timestamp(&candle.start))
                    .bind(candle.end.as_ref().map(format_storage_timestamp))
                    .bind(candle.open)
                    .bind(candle.high)
                    .bind(candle.low)
                    .bind(candle.close)
                    .bind(candle.volume)
                    .bind(candle.vwap)
                    .execute(&mut *tx)
                    .await;

                if let Err(err) = result {
                    tracing::warn!(
                        symbol = %candle.symbol,
                        start = %candle.start,
                        error = %err,
                        "Candle write failed, rolling back batch"
                    );
                    tx.rollback().await?;
                    return Err(err.into());
                }
            }
            tx.commit().await?;
            Ok::<_, StoreError>(candles.len())
        })
        .await?;

        tracing::debug!(rows = written, "Upserted candle batch");
        Ok(written)
    }

    async fn latest_period_end(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Option<DateTime<FixedOffset>>, StoreError> {
        let pool = &self.pool;
        let latest: Option<String> =
            with_retry(&self.retry, "latest_period_end", move || async move {
                let value = sqlx::query_scalar::<_, Option<String>>(
                    r#"SELECT MAX("end") FROM candles WHERE symbol = $1 AND "interval" = $2"#,
                )
                .bind(symbol)
                .bind(interval.as_str())
                .fetch_one(pool)
                .await?;
                Ok::<_, StoreError>(value)
            })
            .await?;

        latest
            .as_deref()
            .map(|value| super::decode_timestamp("end", value))
            .transpose()
    }

    async fn query_range(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<Candle>, StoreError> {
        let pool = &self.pool;
        let start = format_storage_timestamp(&start);
        let end = format_storage_timestamp(&end);
        let (start, end) = (start.as_str(), end.as_str());
        let sql = format!(
            r#"SELECT {CANDLE_COLUMNS} FROM candles
               WHERE symbol = $1 AND "interval" = $2 AND start >= $3 AND start <= $4
               ORDER BY start"#
        );
        let sql = sql.as_str();

        let rows = with_retry(&self.retry, "query_range", move || async move {
            let rows = sqlx::query_as::<_, CandleRow>(sql)
                .bind(symbol)
                .bind(interval.as_str())
                .bind(start)
                .bind(end)
                .fetch_all(pool)
                .await?;
            Ok::<_, StoreError>(rows)
        })
        .await?;

        decode_rows(rows)
    }

    async fn latest_close(&self, symbol: &str) -> Result<Option<f64>, StoreError> {
        let pool = &self.pool;
        let close: Option<Option<f64>> =
            with_retry(&self.retry, "latest_close", move || async move {
                let close = sqlx::query_scalar::<_, Option<f64>>(
                    "SELECT close FROM candles WHERE symbol = $1 ORDER BY start DESC, id DESC LIMIT 1",
                )
                .bind(symbol)
                .fetch_optional(pool)
                .await?;
                Ok::<_, StoreError>(close)
            })
            .await?;
        Ok(close.flatten())
    }

    async fn load_all(&self) -> Result<Vec<Candle>, StoreError> {
        let pool = &self.pool;
        let sql = format!(
            r#"SELECT {CANDLE_COLUMNS} FROM candles ORDER BY symbol, "interval", start"#
        );
        let sql = sql.as_str();

        let rows = with_retry(&self.retry, "load_all", move || async move {
            let rows = sqlx::query_as::<_, CandleRow>(sql).fetch_all(pool).await?;
            Ok::<_, StoreError>(rows)
        })
        .await?;

        tracing::debug!(rows = rows.len(), "Loaded all candles");
        decode_rows(rows)
    }

    async fn backup(&self, _dir: &Path, _date: NaiveDate) -> Result<PathBuf, StoreError> {
        // Server-side dumps belong to pg_dump
        Err(StoreError::Unsupported("backup"))
    }
}
