//! CLI interface for candle-cache
//!
//! Provides subcommands for:
//! - `sync` / `sync-symbol`: Incremental candle download
//! - `add-symbol` / `import-symbols`: Symbol cache maintenance
//! - `export` / `snapshot-info`: Parquet snapshots
//! - `latest` / `range` / `backup`: Store queries and maintenance
//! - `config`: Show configuration

mod export;
mod store;
mod symbols;
mod sync;

pub use export::{ExportArgs, SnapshotInfoArgs};
pub use store::{BackupArgs, LatestArgs, RangeArgs};
pub use symbols::{AddSymbolArgs, ImportSymbolsArgs};
pub use sync::{SyncArgs, SyncSymbolArgs};

use crate::client::{MarketDataClient, QuestradeClient};
use crate::config::Config;
use crate::symbols::LocalSymbolDirectory;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "candle-cache")]
#[command(about = "Local cache of market candles with incremental sync and Parquet snapshots")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync tracked symbols (or the listed ones)
    Sync(SyncArgs),
    /// Sync a single symbol
    SyncSymbol(SyncSymbolArgs),
    /// Add a symbol to the symbol cache
    AddSymbol(AddSymbolArgs),
    /// Import symbols from a CSV file
    ImportSymbols(ImportSymbolsArgs),
    /// Write today's Parquet snapshot
    Export(ExportArgs),
    /// Describe the newest Parquet snapshot
    SnapshotInfo(SnapshotInfoArgs),
    /// Show the latest close for a symbol
    Latest(LatestArgs),
    /// Print stored candles in a time range
    Range(RangeArgs),
    /// Back up the candle database
    Backup(BackupArgs),
    /// Show configuration
    Config,
}

fn api_client(config: &Config) -> anyhow::Result<Arc<dyn MarketDataClient>> {
    let client = QuestradeClient::with_config(&config.api).context("creating API client")?;
    Ok(Arc::new(client))
}

async fn symbol_directory(
    config: &Config,
    client: Arc<dyn MarketDataClient>,
) -> anyhow::Result<LocalSymbolDirectory> {
    LocalSymbolDirectory::open(&config.symbols.path, client).await
}

/// Print the effective configuration
pub fn show_config(config: &Config) {
    println!("Current configuration:");
    println!("  Storage: {:?}", config.storage.backend);
    println!("    SQLite: {}", config.storage.sqlite_path.display());
    match &config.storage.postgres.url {
        Some(_) => println!("    Postgres: <url>"),
        None => println!(
            "    Postgres: {}@{}:{}/{}",
            config.storage.postgres.user,
            config.storage.postgres.host,
            config.storage.postgres.port,
            config.storage.postgres.database
        ),
    }
    println!(
        "    Retry: {} attempts, {}ms {:?}",
        config.storage.retry_count, config.storage.retry_delay_ms, config.storage.retry_backoff
    );
    println!(
        "  Sync: {} lookback days, interval {}",
        config.sync.default_lookback_days, config.sync.interval
    );
    println!("  Export: {}", config.export.dir.display());
    println!("  Symbols: {}", config.symbols.path.display());
    println!("  API: {} (token {})", config.api.login_url, config.api.token_path.display());
    println!(
        "  Telemetry: {} ({:?})",
        config.telemetry.log_level, config.telemetry.log_format
    );
}
