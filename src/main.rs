use candle_cache::cli::{show_config, Cli, Commands};
use candle_cache::config::Config;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize telemetry
    candle_cache::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Sync(args) => {
            tracing::info!("Starting candle sync");
            args.execute(&config).await?;
        }
        Commands::SyncSymbol(args) => args.execute(&config).await?,
        Commands::AddSymbol(args) => args.execute(&config).await?,
        Commands::ImportSymbols(args) => {
            tracing::info!(path = %args.csv.display(), "Importing symbols");
            args.execute(&config).await?;
        }
        Commands::Export(args) => args.execute(&config).await?,
        Commands::SnapshotInfo(args) => args.execute(&config).await?,
        Commands::Latest(args) => args.execute(&config).await?,
        Commands::Range(args) => args.execute(&config).await?,
        Commands::Backup(args) => args.execute(&config).await?,
        Commands::Config => show_config(&config),
    }

    Ok(())
}
