//! Sync engine
//!
//! Brings the candle store up to date with the remote API, one series at a
//! time. A series with no stored candles gets the configured lookback window;
//! otherwise only the candles at or after the stored watermark (the greatest
//! persisted `end`) are fetched. Failures in bulk runs are isolated per
//! symbol.

mod clock;
pub mod window;

pub use clock::{Clock, FixedClock, SystemClock};

use crate::candle::{Candle, Interval};
use crate::client::MarketDataClient;
use crate::config::SyncConfig;
use crate::store::CandleStore;
use crate::symbols::SymbolDirectory;
use crate::telemetry::{increment_counter, record_latency, CounterMetric, LatencyMetric};
use anyhow::Context;
use chrono::{DateTime, FixedOffset};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// How the fetch window of a series was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// No stored candles; fetched the lookback window
    FullHistory,
    /// Resumed from the stored watermark
    Continuation,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::FullHistory => write!(f, "full history"),
            SyncMode::Continuation => write!(f, "continuation"),
        }
    }
}

/// Outcome of syncing one series
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolSync {
    Updated {
        rows: usize,
        mode: SyncMode,
        /// Start of the requested window
        from: DateTime<FixedOffset>,
    },
    /// Nothing new upstream
    NoUpdate { mode: SyncMode },
}

/// A symbol whose sync failed during a bulk run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolFailure {
    pub symbol: String,
    /// Rendered error chain
    pub error: String,
}

/// Summary of a bulk run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Symbols that received rows, with the row count
    pub updated: Vec<(String, usize)>,
    pub unchanged: Vec<String>,
    pub failed: Vec<SymbolFailure>,
}

impl SyncReport {
    pub fn total_rows(&self) -> usize {
        self.updated.iter().map(|(_, rows)| rows).sum()
    }

    pub fn processed(&self) -> usize {
        self.updated.len() + self.unchanged.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Incremental candle synchronizer
pub struct CandleSync {
    store: Arc<dyn CandleStore>,
    client: Arc<dyn MarketDataClient>,
    directory: Arc<dyn SymbolDirectory>,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
}

impl CandleSync {
    pub fn new(
        store: Arc<dyn CandleStore>,
        client: Arc<dyn MarketDataClient>,
        directory: Arc<dyn SymbolDirectory>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            client,
            directory,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock (tests pin "today" with [`FixedClock`])
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create the candle tables and indexes if missing
    pub async fn prepare(&self) -> anyhow::Result<()> {
        self.store.ensure_schema().await.context("creating candle schema")?;
        self.store.ensure_indexed().await.context("creating candle indexes")?;
        Ok(())
    }

    /// Bring one `(ticker, interval)` series up to date.
    ///
    /// Expects the schema to exist; see [`CandleSync::prepare`].
    pub async fn sync_symbol(&self, ticker: &str, interval: Interval) -> anyhow::Result<SymbolSync> {
        let started = Instant::now();

        let info = self
            .directory
            .resolve(ticker)
            .await
            .with_context(|| format!("resolving {}", ticker))?;
        let symbol = info.symbol.as_str();
        self.store
            .register_symbol(info.symbol_id, symbol, info.description.as_deref())
            .await
            .with_context(|| format!("registering {}", symbol))?;

        let now = self.clock.now();
        let window_end = window::end_of_day(now);
        let watermark = self
            .store
            .latest_period_end(symbol, interval)
            .await
            .with_context(|| format!("reading watermark for {} {}", symbol, interval))?;

        let (mode, from) = match watermark {
            None => {
                let days = self.config.default_lookback_days;
                let from = window::lookback_start(now, days).with_context(|| {
                    format!("lookback of {} days from {} is out of range", days, now.date_naive())
                })?;
                (SyncMode::FullHistory, from)
            }
            Some(w) => (SyncMode::Continuation, w.with_timezone(now.offset())),
        };

        if from >= window_end {
            tracing::info!(symbol = %symbol, interval = %interval, watermark = %from, "No update, already current");
            record_latency(LatencyMetric::SymbolSync, started.elapsed());
            return Ok(SymbolSync::NoUpdate { mode });
        }

        tracing::debug!(
            symbol = %symbol,
            interval = %interval,
            mode = %mode,
            start = %window::api_timestamp(&from),
            end = %window::api_timestamp(&window_end),
            "Fetching candles"
        );

        let fetch_started = Instant::now();
        let remote = self
            .client
            .get_candles(info.symbol_id, from, window_end, interval)
            .await
            .with_context(|| format!("fetching {} {} candles", symbol, interval))?;
        record_latency(LatencyMetric::CandleFetch, fetch_started.elapsed());

        let fetched = remote.len();
        let candles: Vec<Candle> = remote
            .into_iter()
            .filter(|c| match watermark {
                Some(w) => c.start >= w,
                None => true,
            })
            .map(|c| c.tag(symbol, interval))
            .collect();

        if candles.len() < fetched {
            tracing::debug!(
                symbol = %symbol,
                discarded = fetched - candles.len(),
                "Dropped candles starting before the watermark"
            );
        }

        if candles.is_empty() {
            match mode {
                SyncMode::FullHistory => {
                    tracing::warn!(symbol = %symbol, interval = %interval, "No update, API returned no history")
                }
                SyncMode::Continuation => {
                    tracing::info!(symbol = %symbol, interval = %interval, "No update")
                }
            }
            record_latency(LatencyMetric::SymbolSync, started.elapsed());
            return Ok(SymbolSync::NoUpdate { mode });
        }

        let rows = self
            .store
            .upsert_candles(&candles)
            .await
            .with_context(|| format!("storing {} {} candles", symbol, interval))?;
        increment_counter(CounterMetric::RowsUpserted, rows as u64);
        record_latency(LatencyMetric::SymbolSync, started.elapsed());

        tracing::info!(symbol = %symbol, interval = %interval, rows, mode = %mode, "Candles updated");
        Ok(SymbolSync::Updated { rows, mode, from })
    }

    /// Sync the given tickers in order; per-symbol failures are recorded
    /// and the run continues
    pub async fn sync_many(&self, tickers: &[String], interval: Interval) -> anyhow::Result<SyncReport> {
        self.prepare().await?;

        let total = tickers.len();
        let progress = self.progress_bar(total)?;
        let mut report = SyncReport::default();

        tracing::info!(symbols = total, interval = %interval, "Starting candle sync");

        for (index, ticker) in tickers.iter().enumerate() {
            progress.set_message(ticker.clone());

            match self.sync_symbol(ticker, interval).await {
                Ok(SymbolSync::Updated { rows, .. }) => {
                    increment_counter(CounterMetric::SymbolsSynced, 1);
                    report.updated.push((ticker.clone(), rows));
                }
                Ok(SymbolSync::NoUpdate { .. }) => {
                    increment_counter(CounterMetric::SymbolsSynced, 1);
                    report.unchanged.push(ticker.clone());
                }
                Err(e) => {
                    let error = format!("{:#}", e);
                    tracing::error!(symbol = %ticker, error = %error, "Symbol sync failed");
                    increment_counter(CounterMetric::SymbolsFailed, 1);
                    report.failed.push(SymbolFailure {
                        symbol: ticker.clone(),
                        error,
                    });
                }
            }

            let done = index + 1;
            progress.inc(1);
            tracing::info!(
                progress = %format!("{}/{}", done, total),
                pct = %format!("{:.1}", done as f64 * 100.0 / total as f64),
                symbol = %ticker,
                "Sync progress"
            );
        }

        progress.finish_with_message("done");
        tracing::info!(
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            rows = report.total_rows(),
            "Candle sync finished"
        );
        Ok(report)
    }

    /// Sync every symbol the directory tracks
    pub async fn sync_all(&self, interval: Interval) -> anyhow::Result<SyncReport> {
        let tickers: Vec<String> = self
            .directory
            .all()
            .await
            .context("listing tracked symbols")?
            .into_iter()
            .map(|info| info.symbol)
            .collect();

        if tickers.is_empty() {
            tracing::warn!("No tracked symbols; import or add symbols first");
        }
        self.sync_many(&tickers, interval).await
    }

    fn progress_bar(&self, total: usize) -> anyhow::Result<ProgressBar> {
        if !self.config.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({percent}%) {msg}")?
                .progress_chars("#>-"),
        );
        Ok(bar)
    }
}
