//! Incremental sync against canned API responses

use crate::common::{remote, sqlite_store, ts, MockApi, MockDirectory};
use candle_cache::candle::Interval;
use candle_cache::config::SyncConfig;
use candle_cache::store::{CandleStore, SqliteCandleStore};
use candle_cache::sync::{CandleSync, FixedClock, SymbolSync, SyncMode};
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use std::path::Path;
use std::sync::{Arc, Mutex};

const NOW: &str = "2024-05-01T15:00:00-04:00";

const UNIVERSE: [(&str, i64); 5] = [
    ("AAPL", 8049),
    ("MSFT", 27426),
    ("IBM", 2067121),
    ("KO", 16529),
    ("XOM", 27725),
];

struct Harness {
    store: Arc<SqliteCandleStore>,
    api: Arc<MockApi>,
    sync: CandleSync,
}

async fn harness(dir: &Path) -> Harness {
    let config = SyncConfig {
        show_progress: false,
        ..SyncConfig::default()
    };
    harness_at(dir, NOW, config).await
}

async fn harness_at(dir: &Path, now: &str, config: SyncConfig) -> Harness {
    let store = sqlite_store(dir).await;
    let api = Arc::new(MockApi::default());
    let directory = Arc::new(MockDirectory::new(&UNIVERSE));
    let sync = CandleSync::new(store.clone(), api.clone(), directory, config)
        .with_clock(Arc::new(FixedClock(ts(now))));
    Harness { store, api, sync }
}

#[tokio::test]
async fn test_first_sync_fetches_lookback_window() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;
    h.api.set_candles(
        8049,
        vec![
            remote("2024-04-30T09:30:00-04:00", 170.0),
            remote("2024-04-30T09:31:00-04:00", 170.5),
            remote("2024-05-01T09:30:00-04:00", 171.0),
        ],
    );

    let outcome = h.sync.sync_symbol("AAPL", Interval::OneMinute).await.unwrap();

    assert_eq!(
        outcome,
        SymbolSync::Updated {
            rows: 3,
            mode: SyncMode::FullHistory,
            from: ts("2024-01-02T00:00:00-04:00"),
        }
    );
    let requests = h.api.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].symbol_id, 8049);
    assert_eq!(requests[0].start, ts("2024-01-02T00:00:00-04:00"));
    assert_eq!(requests[0].end, ts("2024-05-01T23:59:00-04:00"));
    assert_eq!(requests[0].start.offset(), ts(NOW).offset());

    assert_eq!(
        h.store.latest_period_end("AAPL", Interval::OneMinute).await.unwrap(),
        Some(ts("2024-05-01T09:31:00-04:00"))
    );
}

#[tokio::test]
async fn test_continuation_starts_at_watermark_and_drops_older_rows() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;
    h.api.set_candles(
        8049,
        vec![
            remote("2024-05-01T09:30:00-04:00", 171.0),
            remote("2024-05-01T09:31:00-04:00", 171.5),
        ],
    );
    h.sync.sync_symbol("AAPL", Interval::OneMinute).await.unwrap();
    let watermark = ts("2024-05-01T09:32:00-04:00");

    // upstream revises the old bar and adds two new ones
    h.api.set_candles(
        8049,
        vec![
            remote("2024-05-01T09:31:00-04:00", 999.0),
            remote("2024-05-01T09:32:00-04:00", 172.0),
            remote("2024-05-01T09:33:00-04:00", 172.5),
        ],
    );
    let outcome = h.sync.sync_symbol("AAPL", Interval::OneMinute).await.unwrap();

    assert_eq!(
        outcome,
        SymbolSync::Updated {
            rows: 2,
            mode: SyncMode::Continuation,
            from: watermark,
        }
    );
    assert_eq!(h.api.requests()[1].start, watermark);

    let stored = h
        .store
        .query_range(
            "AAPL",
            Interval::OneMinute,
            ts("2024-05-01T09:31:00-04:00"),
            ts("2024-05-01T09:31:00-04:00"),
        )
        .await
        .unwrap();
    assert_eq!(stored[0].close, Some(171.5));
    assert_eq!(h.store.load_all().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_empty_continuation_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;
    h.api.set_candles(8049, vec![remote("2024-05-01T09:30:00-04:00", 171.0)]);
    h.sync.sync_symbol("AAPL", Interval::OneMinute).await.unwrap();
    let before = h.store.load_all().await.unwrap();

    h.api.set_candles(8049, vec![]);
    let outcome = h.sync.sync_symbol("AAPL", Interval::OneMinute).await.unwrap();

    assert_eq!(outcome, SymbolSync::NoUpdate { mode: SyncMode::Continuation });
    assert_eq!(h.store.load_all().await.unwrap(), before);
}

#[tokio::test]
async fn test_empty_history_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;

    let outcome = h.sync.sync_symbol("KO", Interval::OneDay).await.unwrap();

    assert_eq!(outcome, SymbolSync::NoUpdate { mode: SyncMode::FullHistory });
    assert!(h.store.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_watermark_past_window_end_skips_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;
    let mut bar = remote("2024-05-01T23:59:00-04:00", 171.0).tag("AAPL", Interval::OneMinute);
    bar.end = Some(ts("2024-05-02T00:00:00-04:00"));
    h.store.upsert_candles(&[bar]).await.unwrap();

    let outcome = h.sync.sync_symbol("AAPL", Interval::OneMinute).await.unwrap();

    assert_eq!(outcome, SymbolSync::NoUpdate { mode: SyncMode::Continuation });
    assert!(h.api.requests().is_empty());
}

/// Records the names of histograms touched while installed
#[derive(Default)]
struct HistogramNames(Mutex<Vec<String>>);

impl HistogramNames {
    fn count(&self, name: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|n| *n == name).count()
    }
}

impl Recorder for HistogramNames {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
        Counter::noop()
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        self.0.lock().unwrap().push(key.name().to_string());
        Histogram::noop()
    }
}

#[tokio::test]
async fn test_current_series_still_records_sync_latency() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;
    let mut bar = remote("2024-05-01T23:59:00-04:00", 171.0).tag("AAPL", Interval::OneMinute);
    bar.end = Some(ts("2024-05-02T00:00:00-04:00"));
    h.store.upsert_candles(&[bar]).await.unwrap();

    let recorder = HistogramNames::default();
    let outcome = {
        let _guard = metrics::set_default_local_recorder(&recorder);
        h.sync.sync_symbol("AAPL", Interval::OneMinute).await.unwrap()
    };

    assert_eq!(outcome, SymbolSync::NoUpdate { mode: SyncMode::Continuation });
    assert_eq!(recorder.count("candle_cache_symbol_sync_ms"), 1);
    assert_eq!(recorder.count("candle_cache_candle_fetch_ms"), 0);
}

#[tokio::test]
async fn test_batch_isolates_one_failing_symbol() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;
    for (i, (_, id)) in UNIVERSE.iter().enumerate() {
        h.api.set_candles(
            *id,
            vec![
                remote("2024-04-30T09:30:00-04:00", 100.0 + i as f64),
                remote("2024-04-30T09:31:00-04:00", 101.0 + i as f64),
            ],
        );
    }
    h.api.fail(2067121);

    let report = h.sync.sync_all(Interval::OneMinute).await.unwrap();

    assert_eq!(report.updated.len(), 4);
    assert_eq!(report.total_rows(), 8);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].symbol, "IBM");
    assert!(report.failed[0].error.contains("500"));

    // every symbol was attempted, in order
    let attempted: Vec<i64> = h.api.requests().iter().map(|r| r.symbol_id).collect();
    assert_eq!(attempted, UNIVERSE.iter().map(|(_, id)| *id).collect::<Vec<_>>());

    assert!(h
        .store
        .latest_period_end("IBM", Interval::OneMinute)
        .await
        .unwrap()
        .is_none());
    assert!(h
        .store
        .latest_period_end("XOM", Interval::OneMinute)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_unknown_ticker_is_recorded_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;
    h.api.set_candles(27426, vec![remote("2024-04-30T09:30:00-04:00", 400.0)]);

    let tickers = vec!["NOPE".to_string(), "MSFT".to_string()];
    let report = h.sync.sync_many(&tickers, Interval::OneMinute).await.unwrap();

    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].error.contains("resolving NOPE"));
    assert_eq!(report.updated, vec![("MSFT".to_string(), 1)]);
}

#[tokio::test]
async fn test_out_of_range_lookback_fails_only_new_series() {
    let dir = tempfile::tempdir().unwrap();
    let config = SyncConfig {
        default_lookback_days: u32::MAX,
        show_progress: false,
        ..SyncConfig::default()
    };
    let h = harness_at(dir.path(), "2024-05-01T15:00:00+09:00", config).await;
    h.store
        .upsert_candles(&[remote("2024-04-30T09:30:00+09:00", 170.0).tag("AAPL", Interval::OneMinute)])
        .await
        .unwrap();
    h.api.set_candles(8049, vec![remote("2024-05-01T09:30:00+09:00", 171.0)]);
    h.api.set_candles(27426, vec![remote("2024-05-01T09:30:00+09:00", 400.0)]);

    let tickers = vec!["MSFT".to_string(), "AAPL".to_string()];
    let report = h.sync.sync_many(&tickers, Interval::OneMinute).await.unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].symbol, "MSFT");
    assert!(report.failed[0].error.contains("out of range"));
    assert_eq!(report.updated, vec![("AAPL".to_string(), 1)]);
    let attempted: Vec<i64> = h.api.requests().iter().map(|r| r.symbol_id).collect();
    assert_eq!(attempted, vec![8049]);
}

#[tokio::test]
async fn test_second_run_only_reports_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;
    h.api.set_candles(8049, vec![remote("2024-04-30T09:30:00-04:00", 170.0)]);

    let tickers = vec!["AAPL".to_string()];
    let first = h.sync.sync_many(&tickers, Interval::OneMinute).await.unwrap();
    let second = h.sync.sync_many(&tickers, Interval::OneMinute).await.unwrap();

    assert_eq!(first.updated, vec![("AAPL".to_string(), 1)]);
    assert_eq!(second.unchanged, vec!["AAPL".to_string()]);
    assert!(second.is_clean());
}

#[test]
fn test_sync_runs_outside_tokio_main() {
    let dir = tempfile::tempdir().unwrap();
    tokio_test::block_on(async {
        let h = harness(dir.path()).await;
        let report = h.sync.sync_many(&[], Interval::OneMinute).await.unwrap();
        assert_eq!(report.processed(), 0);
    });
}
