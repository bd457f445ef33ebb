//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::graph::DEFAULT_EVENT_BACKLOG_LIMIT;

mod cli;

pub use cli::{CliArgs, Command, ReplayArgs, SessionOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "graphsync";
const DEFAULT_UNDO_LIMIT: usize = 200;
const DEFAULT_NOTIFICATION_BATCH_LIMIT: usize = 256;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub session: SessionSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub undo_limit: NonZeroUsize,
    pub notification_batch_limit: NonZeroUsize,
    pub event_backlog_limit: usize,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable_live_cache: bool,
    pub enable_historical_cache: bool,
    pub materialize_renderables: bool,
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

    builder = builder.add_source(Environment::with_prefix("GRAPHSYNC").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    session: RawSessionSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &SessionOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(limit) = overrides.undo_limit {
            self.session.undo_limit = Some(limit);
        }
        if let Some(limit) = overrides.notification_batch_limit {
            self.session.notification_batch_limit = Some(limit);
        }
        if overrides.no_live_cache {
            self.cache.enable_live_cache = Some(false);
        }
        if overrides.no_historical_cache {
            self.cache.enable_historical_cache = Some(false);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            session,
            cache,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            session: build_session_settings(session)?,
            cache: build_cache_settings(cache),
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            logging: LoggingSettings {
                level: LevelFilter::INFO,
                format: LogFormat::Compact,
            },
            session: SessionSettings {
                undo_limit: NonZeroUsize::new(DEFAULT_UNDO_LIMIT).unwrap_or(NonZeroUsize::MIN),
                notification_batch_limit: NonZeroUsize::new(DEFAULT_NOTIFICATION_BATCH_LIMIT)
                    .unwrap_or(NonZeroUsize::MIN),
                event_backlog_limit: DEFAULT_EVENT_BACKLOG_LIMIT,
            },
            cache: build_cache_settings(RawCacheSettings::default()),
        }
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

fn build_session_settings(session: RawSessionSettings) -> Result<SessionSettings, LoadError> {
    let undo_limit = non_zero_usize(
        session.undo_limit.unwrap_or(DEFAULT_UNDO_LIMIT as u64),
        "session.undo_limit",
    )?;
    let notification_batch_limit = non_zero_usize(
        session
            .notification_batch_limit
            .unwrap_or(DEFAULT_NOTIFICATION_BATCH_LIMIT as u64),
        "session.notification_batch_limit",
    )?;

    let event_backlog_limit = session
        .event_backlog_limit
        .unwrap_or(DEFAULT_EVENT_BACKLOG_LIMIT as u64)
        .try_into()
        .map_err(|_| {
            LoadError::invalid(
                "session.event_backlog_limit",
                "value exceeds supported range for usize",
            )
        })?;

    Ok(SessionSettings {
        undo_limit,
        notification_batch_limit,
        event_backlog_limit,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> CacheSettings {
    CacheSettings {
        enable_live_cache: cache.enable_live_cache.unwrap_or(true),
        enable_historical_cache: cache.enable_historical_cache.unwrap_or(true),
        materialize_renderables: cache.materialize_renderables.unwrap_or(true),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    undo_limit: Option<u64>,
    notification_batch_limit: Option<u64>,
    event_backlog_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_live_cache: Option<bool>,
    enable_historical_cache: Option<bool>,
    materialize_renderables: Option<bool>,
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
