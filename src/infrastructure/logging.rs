// Subscriber setup for the `tracing` events the crate emits

use std::env;
use std::io;

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable read when no level is passed explicitly.
pub const LOG_LEVEL_ENV: &str = "ORFORMS_LOG";
/// Environment variable selecting `pretty` or `json` output.
pub const LOG_FORMAT_ENV: &str = "ORFORMS_LOG_FORMAT";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid {LOG_FORMAT_ENV} '{0}' (expected 'json' or 'pretty')")]
    InvalidFormat(String),

    #[error("Failed to initialize logging: {0}")]
    Init(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Result<Self, LoggingError> {
        if value.eq_ignore_ascii_case("pretty") {
            Ok(LogFormat::Pretty)
        } else if value.eq_ignore_ascii_case("json") {
            Ok(LogFormat::Json)
        } else {
            Err(LoggingError::InvalidFormat(value.to_string()))
        }
    }
}

/// Build the filter for `level`, where `off` silences everything.
pub fn level_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if level.eq_ignore_ascii_case("off") {
        Ok(EnvFilter::default().add_directive(LevelFilter::OFF.into()))
    } else {
        EnvFilter::try_new(level).map_err(|err| LoggingError::InvalidFilter(err.to_string()))
    }
}

/// Install a global subscriber writing to stderr.
///
/// When `level` is None the filter comes from `ORFORMS_LOG`, falling back to
/// `off`. Returns false if a subscriber is already installed.
pub fn init_logging(level: Option<&str>) -> Result<bool, LoggingError> {
    if tracing::dispatcher::has_been_set() {
        return Ok(false);
    }

    let level = level
        .map(str::to_string)
        .or_else(|| env::var(LOG_LEVEL_ENV).ok())
        .unwrap_or_else(|| "off".to_string());
    let filter = level_filter(&level)?;

    let format = env::var(LOG_FORMAT_ENV)
        .map(|value| LogFormat::parse(&value))
        .unwrap_or(Ok(LogFormat::Pretty))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr).json())
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr).pretty())
            .try_init(),
    };
    installed.map_err(|err| LoggingError::Init(err.to_string()))?;

    Ok(true)
}
