//! Configuration types for candle-cache

use crate::candle::Interval;
use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub symbols: SymbolsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Storage backend selector
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Single SQLite file on local disk
    #[default]
    #[serde(alias = "local-file")]
    Sqlite,
    /// PostgreSQL server
    #[serde(alias = "networked")]
    Postgres,
}

/// Delay growth between storage retries
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetryBackoff {
    #[default]
    Fixed,
    Exponential,
}

/// Candle store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Database file for the SQLite backend
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    /// Connection parameters for the Postgres backend
    #[serde(default)]
    pub postgres: PostgresConfig,

    /// Attempts per operation when the database is busy
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Delay between attempts (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default)]
    pub retry_backoff: RetryBackoff,

    /// Pool size; the sync loop only ever needs one
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Directory for database backups
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./data/candles.db")
}
fn default_retry_count() -> u32 {
    5
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_max_connections() -> u32 {
    1
}
fn default_backup_dir() -> PathBuf {
    PathBuf::from("./data/backups")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            sqlite_path: default_sqlite_path(),
            postgres: PostgresConfig::default(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_backoff: RetryBackoff::Fixed,
            max_connections: default_max_connections(),
            backup_dir: default_backup_dir(),
        }
    }
}

/// PostgreSQL connection parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    /// Full connection URL; overrides the individual fields when set
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_pg_host")]
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    #[serde(default = "default_pg_database")]
    pub database: String,
    #[serde(default = "default_pg_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_pg_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_pg_host() -> String {
    "localhost".to_string()
}
fn default_pg_port() -> u16 {
    5432
}
fn default_pg_database() -> String {
    "candles".to_string()
}
fn default_pg_user() -> String {
    "postgres".to_string()
}
fn default_pg_connect_timeout() -> u64 {
    10
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_pg_host(),
            port: default_pg_port(),
            database: default_pg_database(),
            user: default_pg_user(),
            password: String::new(),
            connect_timeout_secs: default_pg_connect_timeout(),
        }
    }
}

/// Incremental sync configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Days of history fetched for a series with no stored candles
    #[serde(default = "default_lookback_days")]
    pub default_lookback_days: u32,

    /// Interval used when a command does not name one
    #[serde(default)]
    pub interval: Interval,

    /// Draw a progress bar during full-universe runs
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

fn default_lookback_days() -> u32 {
    120
}
fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_lookback_days: default_lookback_days(),
            interval: Interval::OneMinute,
            show_progress: true,
        }
    }
}

/// Parquet snapshot configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./data/parquet")
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
        }
    }
}

/// Symbol cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolsConfig {
    /// SQLite file caching symbol metadata
    #[serde(default = "default_symbols_path")]
    pub path: PathBuf,

    /// Pause between API lookups during CSV import (milliseconds)
    #[serde(default)]
    pub import_delay_ms: u64,
}

fn default_symbols_path() -> PathBuf {
    PathBuf::from("./data/symbols.db")
}

impl Default for SymbolsConfig {
    fn default() -> Self {
        Self {
            path: default_symbols_path(),
            import_delay_ms: 0,
        }
    }
}

/// Questrade API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// OAuth login server
    #[serde(default = "default_login_url")]
    pub login_url: String,

    /// Cached token file
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    /// Refresh token used when no token file exists yet
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// HTTP request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_login_url() -> String {
    "https://login.questrade.com".to_string()
}
fn default_token_path() -> PathBuf {
    PathBuf::from("./secrets/questrade_token.json")
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            token_path: default_token_path(),
            refresh_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
