//! PostgreSQL backend; needs a server
//!
//! Run with `CANDLE_CACHE_PG_URL=postgres://... cargo test -- --ignored`.

use crate::common::{candle, test_retry, ts};
use candle_cache::candle::Interval;
use candle_cache::config::PostgresConfig;
use candle_cache::store::{CandleStore, PostgresCandleStore, StoreError};
use chrono::NaiveDate;

fn pg_store() -> PostgresCandleStore {
    let url = std::env::var("CANDLE_CACHE_PG_URL").expect("CANDLE_CACHE_PG_URL not set");
    let config = PostgresConfig {
        url: Some(url),
        ..PostgresConfig::default()
    };
    PostgresCandleStore::connect(&config, test_retry(), 2).unwrap()
}

#[tokio::test]
#[ignore]
async fn test_postgres_upsert_watermark_and_range() {
    let store = pg_store();
    store.ensure_schema().await.unwrap();
    store.ensure_indexed().await.unwrap();

    // unique per run so reruns against the same database stay independent
    let symbol = format!("T{}", chrono::Utc::now().timestamp_micros());
    let batch = vec![
        candle(&symbol, "2024-01-02T09:30:00-05:00", 1.0),
        candle(&symbol, "2024-01-02T09:31:00-05:00", 2.0),
    ];
    store.upsert_candles(&batch).await.unwrap();
    store.upsert_candles(&batch).await.unwrap();

    assert_eq!(
        store.latest_period_end(&symbol, Interval::OneMinute).await.unwrap(),
        Some(ts("2024-01-02T09:32:00-05:00"))
    );
    let range = store
        .query_range(
            &symbol,
            Interval::OneMinute,
            ts("2024-01-02T09:30:00-05:00"),
            ts("2024-01-02T09:31:00-05:00"),
        )
        .await
        .unwrap();
    assert_eq!(range, batch);
    assert_eq!(store.latest_close(&symbol).await.unwrap(), Some(2.0));
}

#[tokio::test]
#[ignore]
async fn test_postgres_backup_is_unsupported() {
    let store = pg_store();
    let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let result = store.backup(std::path::Path::new("/tmp"), day).await;
    assert!(matches!(result, Err(StoreError::Unsupported("backup"))));
}
