//! SQLite candle store behavior

use crate::common::{candle, sqlite_store, test_retry, ts};
use candle_cache::candle::Interval;
use candle_cache::store::{backup_file_name, CandleStore, SqliteCandleStore, StoreError};
use chrono::NaiveDate;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use std::path::Path;
use std::time::Duration;

/// Second connection to the same database file, outside the store's pool
async fn side_connection(path: &Path) -> SqliteConnection {
    SqliteConnection::connect_with(&SqliteConnectOptions::new().filename(path))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path()).await;
    let batch = vec![
        candle("AAPL", "2024-01-02T09:30:00-05:00", 185.0),
        candle("AAPL", "2024-01-02T09:31:00-05:00", 185.5),
    ];

    assert_eq!(store.upsert_candles(&batch).await.unwrap(), 2);
    assert_eq!(store.upsert_candles(&batch).await.unwrap(), 2);

    assert_eq!(store.load_all().await.unwrap(), batch);
}

#[tokio::test]
async fn test_upsert_replaces_values_for_same_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path()).await;

    store
        .upsert_candles(&[candle("AAPL", "2024-01-02T09:30:00-05:00", 185.0)])
        .await
        .unwrap();
    let mut revised = candle("AAPL", "2024-01-02T09:30:00-05:00", 186.25);
    revised.volume = None;
    store.upsert_candles(&[revised.clone()]).await.unwrap();

    let all = store.load_all().await.unwrap();
    assert_eq!(all, vec![revised]);
    assert!(all[0].volume.is_none());
}

#[tokio::test]
async fn test_same_instant_with_different_offsets_is_one_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path()).await;

    store
        .upsert_candles(&[candle("AAPL", "2024-01-02T09:30:00-05:00", 1.0)])
        .await
        .unwrap();
    store
        .upsert_candles(&[candle("AAPL", "2024-01-02T14:30:00Z", 2.0)])
        .await
        .unwrap();

    let all = store.load_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].close, Some(2.0));
}

#[tokio::test]
async fn test_watermark_tracks_greatest_end_per_series() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path()).await;
    assert!(store
        .latest_period_end("AAPL", Interval::OneMinute)
        .await
        .unwrap()
        .is_none());

    let mut daily = candle("AAPL", "2024-01-05T00:00:00-05:00", 190.0);
    daily.interval = Interval::OneDay;
    daily.end = Some(ts("2024-01-06T00:00:00-05:00"));
    store
        .upsert_candles(&[
            candle("AAPL", "2024-01-02T09:31:00-05:00", 185.5),
            candle("AAPL", "2024-01-02T09:30:00-05:00", 185.0),
            candle("MSFT", "2024-01-03T09:30:00-05:00", 370.0),
            daily,
        ])
        .await
        .unwrap();

    assert_eq!(
        store.latest_period_end("AAPL", Interval::OneMinute).await.unwrap(),
        Some(ts("2024-01-02T09:32:00-05:00"))
    );
    assert_eq!(
        store.latest_period_end("AAPL", Interval::OneDay).await.unwrap(),
        Some(ts("2024-01-06T00:00:00-05:00"))
    );
}

#[tokio::test]
async fn test_range_query_is_inclusive_and_ordered() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path()).await;
    let bars: Vec<_> = (0..5)
        .map(|m| candle("AAPL", &format!("2024-01-02T09:3{}:00-05:00", m), 185.0 + m as f64))
        .rev()
        .collect();
    store.upsert_candles(&bars).await.unwrap();

    let range = store
        .query_range(
            "AAPL",
            Interval::OneMinute,
            ts("2024-01-02T14:31:00Z"),
            ts("2024-01-02T09:33:00-05:00"),
        )
        .await
        .unwrap();

    let starts: Vec<_> = range.iter().map(|c| c.start).collect();
    assert_eq!(
        starts,
        vec![
            ts("2024-01-02T09:31:00-05:00"),
            ts("2024-01-02T09:32:00-05:00"),
            ts("2024-01-02T09:33:00-05:00"),
        ]
    );

    let empty = store
        .query_range("AAPL", Interval::OneDay, ts("2024-01-01T00:00:00Z"), ts("2024-12-31T00:00:00Z"))
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_invalid_record_rejects_whole_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path()).await;

    let mut broken = candle("AAPL", "2024-01-02T09:31:00-05:00", 185.5);
    broken.end = Some(ts("2024-01-02T09:00:00-05:00"));
    let batch = vec![candle("AAPL", "2024-01-02T09:30:00-05:00", 185.0), broken];

    let err = store.upsert_candles(&batch).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidRecord(_)));
    assert!(store.load_all().await.unwrap().is_empty());

    let mut blank = candle("", "2024-01-02T09:32:00-05:00", 1.0);
    blank.symbol = "  ".to_string();
    assert!(store.upsert_candles(&[blank]).await.is_err());
}

#[tokio::test]
async fn test_failed_write_rolls_back_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path()).await;
    let existing = candle("AAPL", "2024-01-02T09:30:00-05:00", 185.0);
    store.upsert_candles(&[existing.clone()]).await.unwrap();

    let mut conn = side_connection(store.path()).await;
    sqlx::query(
        "CREATE TRIGGER reject_ibm BEFORE INSERT ON candles WHEN NEW.symbol = 'IBM' \
         BEGIN SELECT RAISE(ABORT, 'ibm rejected'); END",
    )
    .execute(&mut conn)
    .await
    .unwrap();

    let batch = vec![
        candle("AAPL", "2024-01-02T09:30:00-05:00", 190.0),
        candle("AAPL", "2024-01-02T09:31:00-05:00", 190.5),
        candle("IBM", "2024-01-02T09:30:00-05:00", 160.0),
    ];
    let err = store.upsert_candles(&batch).await.unwrap_err();

    assert!(matches!(err, StoreError::Database(_)), "{}", err);
    assert!(err.to_string().contains("ibm rejected"));
    assert_eq!(store.load_all().await.unwrap(), vec![existing]);
}

#[tokio::test]
async fn test_write_lock_exhausts_retry_budget() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("candles.db");
    let store = SqliteCandleStore::open_with_busy_timeout(&path, test_retry(), 1, Duration::ZERO)
        .await
        .unwrap();
    store.ensure_schema().await.unwrap();

    let mut holder = side_connection(&path).await;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut holder).await.unwrap();

    let bar = candle("AAPL", "2024-01-02T09:30:00-05:00", 185.0);
    let err = store.upsert_candles(&[bar.clone()]).await.unwrap_err();
    assert!(
        matches!(err, StoreError::ContentionExhausted { attempts: 3, .. }),
        "{}",
        err
    );

    sqlx::query("ROLLBACK").execute(&mut holder).await.unwrap();
    assert_eq!(store.upsert_candles(&[bar.clone()]).await.unwrap(), 1);
    assert_eq!(store.load_all().await.unwrap(), vec![bar]);
}

#[tokio::test]
async fn test_null_prices_are_stored_as_null() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path()).await;

    let mut bar = candle("IBM", "2024-01-02T09:30:00-05:00", 160.0);
    bar.open = None;
    bar.high = None;
    bar.low = None;
    bar.close = None;
    bar.vwap = None;
    store.upsert_candles(&[bar.clone()]).await.unwrap();

    assert_eq!(store.load_all().await.unwrap(), vec![bar]);
    assert_eq!(store.latest_close("IBM").await.unwrap(), None);
}

#[tokio::test]
async fn test_latest_close_uses_most_recent_start() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path()).await;
    assert_eq!(store.latest_close("AAPL").await.unwrap(), None);

    store
        .upsert_candles(&[
            candle("AAPL", "2024-01-02T09:31:00-05:00", 185.5),
            candle("AAPL", "2024-01-02T09:30:00-05:00", 185.0),
            candle("MSFT", "2024-01-02T09:35:00-05:00", 370.0),
        ])
        .await
        .unwrap();

    assert_eq!(store.latest_close("AAPL").await.unwrap(), Some(185.5));
}

#[tokio::test]
async fn test_register_symbol_ignores_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path()).await;

    store.register_symbol(8049, "AAPL", Some("APPLE INC")).await.unwrap();
    store.register_symbol(8049, "AAPL", None).await.unwrap();
}

#[tokio::test]
async fn test_schema_setup_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path()).await;
    store.ensure_schema().await.unwrap();
    store.ensure_indexed().await.unwrap();
}

#[tokio::test]
async fn test_reopen_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = sqlite_store(dir.path()).await;
        store
            .upsert_candles(&[candle("AAPL", "2024-01-02T09:30:00-05:00", 185.0)])
            .await
            .unwrap();
    }
    let store = sqlite_store(dir.path()).await;
    assert_eq!(store.load_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_backup_same_day_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path()).await;
    let backups = dir.path().join("backups");
    let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

    store
        .upsert_candles(&[candle("AAPL", "2024-01-02T09:30:00-05:00", 185.0)])
        .await
        .unwrap();
    let first = store.backup(&backups, day).await.unwrap();
    store
        .upsert_candles(&[candle("AAPL", "2024-01-02T09:31:00-05:00", 185.5)])
        .await
        .unwrap();
    let second = store.backup(&backups, day).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second, backups.join(backup_file_name(day)));
    assert_eq!(std::fs::read_dir(&backups).unwrap().count(), 1);

    let restored = candle_cache::store::SqliteCandleStore::open(&second, crate::common::test_retry(), 1)
        .await
        .unwrap();
    assert_eq!(restored.load_all().await.unwrap().len(), 2);
}
