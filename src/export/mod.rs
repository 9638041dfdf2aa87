//! Columnar export
//!
//! Dumps the whole candle store to a dated Parquet snapshot
//! (`{YYYYMMDD}_all_candles.parquet`) and reads the newest one back.

mod parquet;

pub use self::parquet::{candle_schema, read_candles, write_candles};

use crate::candle::{Candle, Interval};
use crate::store::CandleStore;
use crate::sync::{Clock, SystemClock};
use crate::telemetry::{increment_counter, record_latency, CounterMetric, LatencyMetric};
use anyhow::Context;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

const SNAPSHOT_SUFFIX: &str = "_all_candles.parquet";

/// Snapshot read errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// No snapshot file in the export directory
    #[error("no candle snapshot found in {0}")]
    NotFound(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    /// File decoded but does not hold candles
    #[error("malformed snapshot {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Snapshot file name for a day, e.g. `20240102_all_candles.parquet`
pub fn snapshot_file_name(date: NaiveDate) -> String {
    format!("{}{}", date.format("%Y%m%d"), SNAPSHOT_SUFFIX)
}

fn is_snapshot_name(name: &str) -> bool {
    name.strip_suffix(SNAPSHOT_SUFFIX)
        .is_some_and(|date| date.len() == 8 && date.bytes().all(|b| b.is_ascii_digit()))
}

/// Newest snapshot in `dir` by file name
pub fn latest_snapshot_path(dir: &Path) -> Result<PathBuf, SnapshotError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SnapshotError::NotFound(dir.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    let mut latest: Option<String> = None;
    for entry in entries {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if is_snapshot_name(&name) && latest.as_deref() < Some(name.as_str()) {
            latest = Some(name);
        }
    }

    latest
        .map(|name| dir.join(name))
        .ok_or_else(|| SnapshotError::NotFound(dir.to_path_buf()))
}

/// Candles loaded from one snapshot file
#[derive(Debug, Clone)]
pub struct CandleSnapshot {
    pub path: PathBuf,
    /// Ordered by `(symbol, interval, start)`
    pub candles: Vec<Candle>,
}

impl CandleSnapshot {
    /// One series in start order
    pub fn series(&self, symbol: &str, interval: Interval) -> Vec<&Candle> {
        self.candles
            .iter()
            .filter(|c| c.symbol == symbol && c.interval == interval)
            .collect()
    }

    /// Distinct symbols present
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.candles.iter().map(|c| c.symbol.as_str()).collect();
        symbols.dedup();
        symbols
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

/// Writes and loads Parquet snapshots of the candle store
pub struct SnapshotExporter {
    store: Arc<dyn CandleStore>,
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl SnapshotExporter {
    pub fn new(store: Arc<dyn CandleStore>, dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            dir: dir.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock that dates snapshot files
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write today's snapshot of every stored candle.
    ///
    /// Re-exporting on the same day replaces the earlier file.
    pub async fn export_snapshot(&self) -> anyhow::Result<PathBuf> {
        let started = Instant::now();

        let mut candles = self.store.load_all().await.context("loading candles")?;
        // backend collations differ; sort by byte order here
        candles.sort_by(|a, b| {
            (a.symbol.as_str(), a.interval.as_str(), a.start)
                .cmp(&(b.symbol.as_str(), b.interval.as_str(), b.start))
        });

        let date = self.clock.now().date_naive();
        let path = self.dir.join(snapshot_file_name(date));
        write_candles(&path, &candles)
            .with_context(|| format!("writing snapshot {}", path.display()))?;

        increment_counter(CounterMetric::SnapshotsWritten, 1);
        record_latency(LatencyMetric::SnapshotExport, started.elapsed());
        tracing::info!(path = %path.display(), rows = candles.len(), "Candle snapshot exported");
        Ok(path)
    }

    /// Load the newest snapshot in the export directory
    pub fn load_latest_snapshot(&self) -> Result<CandleSnapshot, SnapshotError> {
        load_latest_snapshot(&self.dir)
    }
}

/// Load the newest snapshot in `dir`; no merging across files
pub fn load_latest_snapshot(dir: &Path) -> Result<CandleSnapshot, SnapshotError> {
    let path = latest_snapshot_path(dir)?;
    let candles = read_candles(&path)?;
    tracing::debug!(path = %path.display(), rows = candles.len(), "Loaded candle snapshot");
    Ok(CandleSnapshot { path, candles })
}
