//! candle-cache: local cache of market candles
//!
//! This library provides the core components for:
//! - Candle records, intervals and timestamp codecs
//! - A durable candle store (SQLite or PostgreSQL) with retry on contention
//! - Incremental sync against the Questrade market data API
//! - A cached symbol directory with CSV import
//! - Dated Parquet snapshots of the whole store
//! - Structured logging and metrics

pub mod candle;
pub mod cli;
pub mod client;
pub mod config;
pub mod export;
pub mod store;
pub mod symbols;
pub mod sync;
pub mod telemetry;
