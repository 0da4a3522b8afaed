//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    CheckpointArgs, CliArgs, Command, DatabaseOverride, LoggingOverrides, ServeArgs,
    ServeOverrides,
};

use std::{
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "restodb";
const ENV_PREFIX: &str = "RESTODB";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const MIN_DB_MAX_CONNECTIONS: u32 = 2;
const DEFAULT_DB_ACQUIRE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CHECKPOINT_BATCH_SIZE: u64 = 100;
const DEFAULT_CHECKPOINT_INTERVAL_MS: u64 = 100;
const DEFAULT_CACHE_SUMMARY_LIMIT: u64 = 1024;
const DEFAULT_SLOW_PATH_TIMEOUT_MS: u64 = 2_000;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub checkpoint: CheckpointSettings,
    pub cache: CacheSettings,
    pub read_path: ReadPathSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CheckpointSettings {
    pub batch_size: NonZeroUsize,
    /// Zero disables the background scheduler.
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    /// Capacity of the in-process summary cache; unused by the Postgres backend.
    pub summary_limit: NonZeroUsize,
}

/// Where restaurant summaries are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// The shared `cache_metadata` table.
    Postgres,
    /// A per-process LRU bounded by `summary_limit`.
    Memory,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown cache backend `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadPathSettings {
    pub slow_path_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Checkpoint(args)) => raw.apply_checkpoint_overrides(args),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    checkpoint: RawCheckpointSettings,
    cache: RawCacheSettings,
    read_path: RawReadPathSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_logging_overrides(&overrides.logging);
        self.apply_database_override(&overrides.database);
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(size) = overrides.checkpoint_batch_size {
            self.checkpoint.batch_size = Some(size);
        }
        if let Some(interval) = overrides.checkpoint_interval_ms {
            self.checkpoint.interval_ms = Some(interval);
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(limit) = overrides.cache_summary_limit {
            self.cache.summary_limit = Some(limit);
        }
        if let Some(timeout) = overrides.read_slow_path_timeout_ms {
            self.read_path.slow_path_timeout_ms = Some(timeout);
        }
    }

    fn apply_checkpoint_overrides(&mut self, args: &CheckpointArgs) {
        self.apply_logging_overrides(&args.logging);
        self.apply_database_override(&args.database);
        if let Some(size) = args.checkpoint_batch_size {
            self.checkpoint.batch_size = Some(size);
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            checkpoint,
            cache,
            read_path,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            checkpoint: build_checkpoint_settings(checkpoint)?,
            cache: build_cache_settings(cache)?,
            read_path: build_read_path_settings(read_path)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;
    // A checkpoint run pins one connection for its lease while appliers use others.
    if max_connections.get() < MIN_DB_MAX_CONNECTIONS {
        return Err(LoadError::invalid(
            "database.max_connections",
            format!("must be at least {MIN_DB_MAX_CONNECTIONS}"),
        ));
    }

    let acquire_timeout_ms = database
        .acquire_timeout_ms
        .unwrap_or(DEFAULT_DB_ACQUIRE_TIMEOUT_MS);
    if acquire_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "database.acquire_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(DatabaseSettings {
        url,
        max_connections,
        acquire_timeout: Duration::from_millis(acquire_timeout_ms),
    })
}

fn build_checkpoint_settings(
    checkpoint: RawCheckpointSettings,
) -> Result<CheckpointSettings, LoadError> {
    let batch_size = non_zero_usize(
        checkpoint
            .batch_size
            .unwrap_or(DEFAULT_CHECKPOINT_BATCH_SIZE),
        "checkpoint.batch_size",
    )?;
    let interval_ms = checkpoint
        .interval_ms
        .unwrap_or(DEFAULT_CHECKPOINT_INTERVAL_MS);

    Ok(CheckpointSettings {
        batch_size,
        interval: Duration::from_millis(interval_ms),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend {
        Some(value) => CacheBackend::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.backend", reason))?,
        None => CacheBackend::Postgres,
    };
    let summary_limit = non_zero_usize(
        cache.summary_limit.unwrap_or(DEFAULT_CACHE_SUMMARY_LIMIT),
        "cache.summary_limit",
    )?;

    Ok(CacheSettings {
        backend,
        summary_limit,
    })
}

fn build_read_path_settings(
    read_path: RawReadPathSettings,
) -> Result<ReadPathSettings, LoadError> {
    let timeout_ms = read_path
        .slow_path_timeout_ms
        .unwrap_or(DEFAULT_SLOW_PATH_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "read_path.slow_path_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(ReadPathSettings {
        slow_path_timeout: Duration::from_millis(timeout_ms),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCheckpointSettings {
    batch_size: Option<u64>,
    interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    summary_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawReadPathSettings {
    slow_path_timeout_ms: Option<u64>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value_usize: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value_usize).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
