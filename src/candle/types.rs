//! Candle record types

use super::Interval;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// One persisted OHLCV bar for `symbol` at `interval` over `[start, end)`.
///
/// `(symbol, interval, start)` is the merge key; every other field is
/// replaced wholesale on upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Ticker, e.g. "AAPL"
    pub symbol: String,
    /// Bar granularity
    pub interval: Interval,
    /// Period start (inclusive)
    pub start: DateTime<FixedOffset>,
    /// Period end (exclusive)
    pub end: Option<DateTime<FixedOffset>>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
    /// Volume-weighted average price
    pub vwap: Option<f64>,
}

impl Candle {
    /// Check the fields the store cannot repair.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err(format!("candle at {} has a blank symbol", self.start));
        }
        if let Some(end) = self.end {
            if end < self.start {
                return Err(format!(
                    "{} {} candle ends ({}) before it starts ({})",
                    self.symbol, self.interval, end, self.start
                ));
            }
        }
        Ok(())
    }
}

/// A candle as returned by the market data API.
///
/// The API omits symbol and interval; [`RemoteCandle::tag`] attaches them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCandle {
    pub start: DateTime<FixedOffset>,
    #[serde(default)]
    pub end: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub volume: Option<i64>,
    #[serde(default, rename = "VWAP", alias = "vwap")]
    pub vwap: Option<f64>,
}

impl RemoteCandle {
    /// Attach symbol and interval, producing a storable candle
    pub fn tag(self, symbol: &str, interval: Interval) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            interval,
            start: self.start,
            end: self.end,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            vwap: self.vwap,
        }
    }
}
