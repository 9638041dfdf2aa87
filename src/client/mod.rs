//! Market data API client
//!
//! The sync engine only sees the [`MarketDataClient`] trait;
//! [`QuestradeClient`] is the production implementation.

mod questrade;
mod token;

pub use questrade::QuestradeClient;
pub use token::{Token, TokenStore};

use crate::candle::{Interval, RemoteCandle};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// First hit of a symbol search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMatch {
    pub symbol: String,
    pub symbol_id: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub security_type: Option<String>,
    #[serde(default)]
    pub listing_exchange: Option<String>,
    #[serde(default)]
    pub is_tradable: Option<bool>,
    #[serde(default)]
    pub is_quotable: Option<bool>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Full symbol metadata record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub symbol_id: i64,
    pub description: Option<String>,
    pub security_type: Option<String>,
    pub listing_exchange: Option<String>,
    pub currency: Option<String>,
    pub industry_sector: Option<String>,
    pub industry_group: Option<String>,
    pub industry_subgroup: Option<String>,
    pub is_tradable: Option<bool>,
    pub is_quotable: Option<bool>,
    pub has_options: Option<bool>,
    pub prev_day_close_price: Option<f64>,
    pub high_price52: Option<f64>,
    pub low_price52: Option<f64>,
    pub average_vol3_months: Option<i64>,
    pub average_vol20_days: Option<i64>,
    pub outstanding_shares: Option<i64>,
    pub market_cap: Option<f64>,
    pub eps: Option<f64>,
    pub pe: Option<f64>,
    pub dividend: Option<f64>,
    #[serde(rename = "yield")]
    pub dividend_yield: Option<f64>,
    pub ex_date: Option<String>,
    pub dividend_date: Option<String>,
    pub trade_unit: Option<i64>,
}

impl SymbolInfo {
    /// Minimal record with only the identifying fields set
    pub fn new(symbol: impl Into<String>, symbol_id: i64) -> Self {
        Self {
            symbol: symbol.into(),
            symbol_id,
            ..Default::default()
        }
    }
}

/// Remote source of candles and symbol metadata
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Candles for `[start, end]` at `interval`; an empty range is `Ok(vec![])`
    async fn get_candles(
        &self,
        symbol_id: i64,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        interval: Interval,
    ) -> anyhow::Result<Vec<RemoteCandle>>;

    /// First symbol matching `ticker`
    async fn search_symbol(&self, ticker: &str) -> anyhow::Result<SymbolMatch>;

    /// Full metadata for an internal symbol id
    async fn get_symbol_details(&self, symbol_id: i64) -> anyhow::Result<SymbolInfo>;
}
