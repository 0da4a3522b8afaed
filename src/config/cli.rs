use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the restodb binary.
#[derive(Debug, Parser)]
#[command(
    name = "restodb",
    version,
    about = "Deferred write buffer with checkpoint commits and a cache-aside read path"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "RESTODB_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the checkpoint scheduler until interrupted.
    Serve(Box<ServeArgs>),
    /// Drain every pending buffer entry once and exit.
    Checkpoint(CheckpointArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the number of buffer entries applied per checkpoint run.
    #[arg(long = "checkpoint-batch-size", value_name = "COUNT")]
    pub checkpoint_batch_size: Option<u64>,

    /// Override the checkpoint interval; 0 disables the scheduler.
    #[arg(long = "checkpoint-interval-ms", value_name = "MILLIS")]
    pub checkpoint_interval_ms: Option<u64>,

    /// Override where restaurant summaries are cached (postgres|memory).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the number of restaurant summaries kept in memory.
    #[arg(long = "cache-summary-limit", value_name = "COUNT")]
    pub cache_summary_limit: Option<u64>,

    /// Override the restaurant store timeout used on cache misses.
    #[arg(long = "read-slow-path-timeout-ms", value_name = "MILLIS")]
    pub read_slow_path_timeout_ms: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CheckpointArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the number of buffer entries applied per checkpoint run.
    #[arg(long = "checkpoint-batch-size", value_name = "COUNT")]
    pub checkpoint_batch_size: Option<u64>,
}
