//! Store query and maintenance commands

use crate::candle::{parse_timestamp, Interval};
use crate::config::Config;
use crate::store::open_store;
use crate::sync::window;
use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate};
use clap::Args;

#[derive(Args, Debug)]
pub struct LatestArgs {
    /// Ticker to query
    pub ticker: String,
}

impl LatestArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = open_store(&config.storage).await?;
        store.ensure_schema().await?;
        let symbol = self.ticker.trim().to_uppercase();

        match store.latest_close(&symbol).await? {
            Some(close) => println!("{} last close: {}", symbol, close),
            None => println!("{}: no stored candles", symbol),
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct RangeArgs {
    /// Ticker to query
    pub ticker: String,

    /// Range start: RFC 3339 timestamp or YYYY-MM-DD (local midnight)
    #[arg(long)]
    pub start: String,

    /// Range end: RFC 3339 timestamp or YYYY-MM-DD (whole day included)
    #[arg(long)]
    pub end: String,

    /// Candle interval, e.g. OneMinute or OneDay
    #[arg(short, long)]
    pub interval: Option<Interval>,
}

impl RangeArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let offset = *Local::now().fixed_offset().offset();
        let start = parse_bound(&self.start, Bound::Start, offset)?;
        let end = parse_bound(&self.end, Bound::End, offset)?;
        if end < start {
            anyhow::bail!("--end {} is before --start {}", self.end, self.start);
        }

        let store = open_store(&config.storage).await?;
        store.ensure_schema().await?;
        let symbol = self.ticker.trim().to_uppercase();
        let interval = self.interval.unwrap_or(config.sync.interval);

        let candles = store.query_range(&symbol, interval, start, end).await?;
        for candle in &candles {
            println!(
                "{}  o={:?} h={:?} l={:?} c={:?} v={:?} vwap={:?}",
                candle.start.with_timezone(&offset),
                candle.open,
                candle.high,
                candle.low,
                candle.close,
                candle.volume,
                candle.vwap
            );
        }
        println!("{} {} candles: {}", symbol, interval, candles.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Start,
    End,
}

/// Parse a range bound; bare dates cover the whole local day
fn parse_bound(value: &str, bound: Bound, offset: FixedOffset) -> anyhow::Result<DateTime<FixedOffset>> {
    if let Ok(ts) = parse_timestamp(value) {
        return Ok(ts);
    }
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("invalid time {:?}: expected RFC 3339 or YYYY-MM-DD", value))?;

    let midnight = window::start_of_day(date, offset)
        .ok_or_else(|| anyhow::anyhow!("date {} is out of range", date))?;
    Ok(match bound {
        Bound::Start => midnight,
        Bound::End => midnight + Duration::days(1) - Duration::microseconds(1),
    })
}

#[derive(Args, Debug)]
pub struct BackupArgs {}

impl BackupArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = open_store(&config.storage).await?;
        let today = Local::now().date_naive();
        let path = store.backup(&config.storage.backup_dir, today).await?;
        println!("Backup written to {}", path.display());
        Ok(())
    }
}
