//! Snapshot commands

use crate::candle::Interval;
use crate::config::Config;
use crate::export::{load_latest_snapshot, SnapshotExporter};
use crate::store::open_store;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output directory (overrides config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ExportArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = open_store(&config.storage).await?;
        store.ensure_schema().await?;
        let dir = self.output.clone().unwrap_or_else(|| config.export.dir.clone());

        let path = SnapshotExporter::new(store, dir).export_snapshot().await?;
        println!("Snapshot written to {}", path.display());
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct SnapshotInfoArgs {
    /// Print the candles of one symbol
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Interval of the printed series
    #[arg(short, long)]
    pub interval: Option<Interval>,

    /// Snapshot directory (overrides config)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,
}

impl SnapshotInfoArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let dir = self.dir.clone().unwrap_or_else(|| config.export.dir.clone());
        let snapshot = load_latest_snapshot(&dir)?;

        println!("Snapshot: {}", snapshot.path.display());
        println!("  Rows: {}", snapshot.len());
        println!("  Symbols: {}", snapshot.symbols().len());

        if let Some(symbol) = &self.symbol {
            let interval = self.interval.unwrap_or(config.sync.interval);
            for candle in snapshot.series(&symbol.to_uppercase(), interval) {
                println!(
                    "{}  o={:?} h={:?} l={:?} c={:?} v={:?}",
                    candle.start, candle.open, candle.high, candle.low, candle.close, candle.volume
                );
            }
        }
        Ok(())
    }
}
