//! Candle domain types
//!
//! OHLCV bars, bar granularities and the timestamp codecs shared by the
//! store, the API client and the Parquet export.

mod interval;
mod time;
mod types;

pub use interval::{Interval, ParseIntervalError};
pub use time::{format_api_timestamp, format_storage_timestamp, parse_timestamp};
pub use types::{Candle, RemoteCandle};
