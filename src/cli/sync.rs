//! Sync command implementations

use super::{api_client, symbol_directory};
use crate::candle::Interval;
use crate::config::Config;
use crate::store::open_store;
use crate::sync::{CandleSync, SymbolSync, SyncReport};
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Comma-separated tickers; defaults to every tracked symbol
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Candle interval, e.g. OneMinute or OneDay
    #[arg(short, long)]
    pub interval: Option<Interval>,
}

impl SyncArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let sync = build_sync(config).await?;
        let interval = self.interval.unwrap_or(config.sync.interval);

        let report = if self.symbols.is_empty() {
            sync.sync_all(interval).await?
        } else {
            sync.sync_many(&self.symbols, interval).await?
        };

        print_report(&report);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct SyncSymbolArgs {
    /// Ticker to sync
    pub ticker: String,

    /// Candle interval, e.g. OneMinute or OneDay
    #[arg(short, long)]
    pub interval: Option<Interval>,
}

impl SyncSymbolArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let sync = build_sync(config).await?;
        let interval = self.interval.unwrap_or(config.sync.interval);

        sync.prepare().await?;
        let outcome = sync.sync_symbol(&self.ticker, interval).await?;
        println!("{}", describe(&self.ticker, &outcome));
        Ok(())
    }
}

async fn build_sync(config: &Config) -> anyhow::Result<CandleSync> {
    let store = open_store(&config.storage).await?;
    let client = api_client(config)?;
    let directory = Arc::new(symbol_directory(config, client.clone()).await?);
    Ok(CandleSync::new(store, client, directory, config.sync.clone()))
}

fn print_report(report: &SyncReport) {
    println!(
        "Sync finished: {} updated ({} rows), {} unchanged, {} failed",
        report.updated.len(),
        report.total_rows(),
        report.unchanged.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        println!("  FAILED {}: {}", failure.symbol, failure.error);
    }
}

/// One-line description of a single-series outcome
fn describe(ticker: &str, outcome: &SymbolSync) -> String {
    match outcome {
        SymbolSync::Updated { rows, mode, from } => {
            format!("{}: {} rows ({} from {})", ticker, rows, mode, from)
        }
        SymbolSync::NoUpdate { .. } => format!("{}: no update", ticker),
    }
}
