//! Symbol directory
//!
//! Maps tickers to the API's internal symbol ids and enumerates the tracked
//! universe. [`LocalSymbolDirectory`] keeps full metadata records in a small
//! SQLite cache and only goes to the API on a miss or a forced refresh.

mod import;

pub use import::{detect_delimiter, read_tickers, ImportSummary};

use crate::client::{MarketDataClient, SymbolInfo};
use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Lookup and enumeration of tracked symbols
#[async_trait]
pub trait SymbolDirectory: Send + Sync {
    /// Metadata for `ticker`, fetched and cached on first use
    async fn resolve(&self, ticker: &str) -> anyhow::Result<SymbolInfo>;

    /// Refetch `ticker` from the API, replacing any cached record
    async fn refresh(&self, ticker: &str) -> anyhow::Result<SymbolInfo>;

    /// Every tracked symbol, ordered by ticker
    async fn all(&self) -> anyhow::Result<Vec<SymbolInfo>>;
}

const CREATE_SYMBOLS: &str = r#"
    CREATE TABLE IF NOT EXISTS symbols (
        symbol TEXT PRIMARY KEY,
        symbol_id INTEGER,
        data TEXT,
        last_updated TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )
"#;

/// SQLite-cached symbol directory backed by the market data API
pub struct LocalSymbolDirectory {
    pool: SqlitePool,
    client: Arc<dyn MarketDataClient>,
}

impl LocalSymbolDirectory {
    /// Open (creating if missing) the cache at `path`
    pub async fn open(path: &Path, client: Arc<dyn MarketDataClient>) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(20));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("opening symbol cache {}", path.display()))?;

        sqlx::query(CREATE_SYMBOLS).execute(&pool).await?;
        tracing::debug!(path = %path.display(), "Symbol cache ready");

        Ok(Self { pool, client })
    }

    async fn cached(&self, ticker: &str) -> anyhow::Result<Option<SymbolInfo>> {
        let data: Option<String> =
            sqlx::query_scalar("SELECT data FROM symbols WHERE symbol = ?1")
                .bind(ticker)
                .fetch_optional(&self.pool)
                .await?;

        data.map(|json| {
            serde_json::from_str(&json)
                .with_context(|| format!("corrupt cached record for {}", ticker))
        })
        .transpose()
    }

    /// Search the API, fetch full details and store them under `ticker`
    async fn fetch_and_store(&self, ticker: &str) -> anyhow::Result<SymbolInfo> {
        let found = self
            .client
            .search_symbol(ticker)
            .await
            .with_context(|| format!("searching for {}", ticker))?;
        let info = self
            .client
            .get_symbol_details(found.symbol_id)
            .await
            .with_context(|| format!("fetching details for {} ({})", ticker, found.symbol_id))?;

        sqlx::query(
            "INSERT OR REPLACE INTO symbols (symbol, symbol_id, data, last_updated) \
             VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)",
        )
        .bind(ticker)
        .bind(info.symbol_id)
        .bind(serde_json::to_string(&info)?)
        .execute(&self.pool)
        .await?;

        tracing::info!(symbol = %ticker, symbol_id = info.symbol_id, "Symbol cached");
        Ok(info)
    }

    /// Import every ticker in a CSV file with a `Symbol` column.
    ///
    /// Each ticker is refetched from the API. A failing row is logged and
    /// counted, and the import moves on.
    pub async fn import_csv(&self, path: &Path, delay: Duration) -> anyhow::Result<ImportSummary> {
        let tickers = read_tickers(path)?;
        let mut summary = ImportSummary::default();

        for ticker in &tickers {
            match self.refresh(ticker).await {
                Ok(_) => summary.imported += 1,
                Err(e) => {
                    tracing::warn!(symbol = %ticker, error = %format!("{:#}", e), "Symbol import failed");
                    summary.failed.push(ticker.clone());
                }
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        tracing::info!(
            imported = summary.imported,
            failed = summary.failed.len(),
            path = %path.display(),
            "Symbol import finished"
        );
        Ok(summary)
    }
}

#[async_trait]
impl SymbolDirectory for LocalSymbolDirectory {
    async fn resolve(&self, ticker: &str) -> anyhow::Result<SymbolInfo> {
        let ticker = normalize_ticker(ticker)?;
        if let Some(info) = self.cached(&ticker).await? {
            return Ok(info);
        }
        self.fetch_and_store(&ticker).await
    }

    async fn refresh(&self, ticker: &str) -> anyhow::Result<SymbolInfo> {
        let ticker = normalize_ticker(ticker)?;
        self.fetch_and_store(&ticker).await
    }

    async fn all(&self) -> anyhow::Result<Vec<SymbolInfo>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT symbol, data FROM symbols ORDER BY symbol")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(symbol, data)| {
                serde_json::from_str(&data)
                    .with_context(|| format!("corrupt cached record for {}", symbol))
            })
            .collect()
    }
}

/// Tickers are cached trimmed and upper-cased
fn normalize_ticker(ticker: &str) -> anyhow::Result<String> {
    let ticker = ticker.trim();
    if ticker.is_empty() {
        anyhow::bail!("empty ticker");
    }
    Ok(ticker.to_uppercase())
}
