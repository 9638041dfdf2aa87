//! Sync and storage metrics
//!
//! Thin wrappers over the `metrics` facade. Nothing is exported unless the
//! embedding process installs a recorder.

use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Candle rows written by upserts
    RowsUpserted,
    /// Symbols whose sync completed (updated or unchanged)
    SymbolsSynced,
    /// Symbols whose sync failed
    SymbolsFailed,
    /// Store operations retried because of contention
    StoreRetries,
    /// Snapshot files written
    SnapshotsWritten,
}

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One symbol's full sync (resolve, fetch, upsert)
    SymbolSync,
    /// Remote candle fetch
    CandleFetch,
    /// Full snapshot export
    SnapshotExport,
}

impl CounterMetric {
    fn name(self) -> &'static str {
        match self {
            CounterMetric::RowsUpserted => "candle_cache_rows_upserted_total",
            CounterMetric::SymbolsSynced => "candle_cache_symbols_synced_total",
            CounterMetric::SymbolsFailed => "candle_cache_symbols_failed_total",
            CounterMetric::StoreRetries => "candle_cache_store_retries_total",
            CounterMetric::SnapshotsWritten => "candle_cache_snapshots_written_total",
        }
    }
}

impl LatencyMetric {
    fn name(self) -> &'static str {
        match self {
            LatencyMetric::SymbolSync => "candle_cache_symbol_sync_ms",
            LatencyMetric::CandleFetch => "candle_cache_candle_fetch_ms",
            LatencyMetric::SnapshotExport => "candle_cache_snapshot_export_ms",
        }
    }
}

/// Add `value` to a counter
pub fn increment_counter(metric: CounterMetric, value: u64) {
    metrics::counter!(metric.name()).increment(value);
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let name = metric.name();
    metrics::histogram!(name).record(duration.as_secs_f64() * 1000.0);
    tracing::trace!(metric = name, value_ms = duration.as_millis() as u64, "Recorded latency");
}
