//! Symbol cache commands

use super::{api_client, symbol_directory};
use crate::config::Config;
use crate::symbols::SymbolDirectory;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct AddSymbolArgs {
    /// Ticker to look up
    pub ticker: String,

    /// Refetch even if the symbol is already cached
    #[arg(short, long)]
    pub force: bool,
}

impl AddSymbolArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let directory = symbol_directory(config, api_client(config)?).await?;
        let info = if self.force {
            directory.refresh(&self.ticker).await?
        } else {
            directory.resolve(&self.ticker).await?
        };

        println!(
            "{} (id {}): {}",
            info.symbol,
            info.symbol_id,
            info.description.as_deref().unwrap_or("-")
        );
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ImportSymbolsArgs {
    /// CSV file with a `Symbol` column
    pub csv: PathBuf,

    /// Pause between API lookups in milliseconds (overrides config)
    #[arg(long)]
    pub delay_ms: Option<u64>,
}

impl ImportSymbolsArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let directory = symbol_directory(config, api_client(config)?).await?;
        let delay = Duration::from_millis(self.delay_ms.unwrap_or(config.symbols.import_delay_ms));

        let summary = directory.import_csv(&self.csv, delay).await?;
        println!(
            "Imported {} symbols from {} ({} failed)",
            summary.imported,
            self.csv.display(),
            summary.failed.len()
        );
        for ticker in &summary.failed {
            println!("  FAILED {}", ticker);
        }
        Ok(())
    }
}
