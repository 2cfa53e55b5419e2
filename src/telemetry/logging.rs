//! Logging configuration and initialization for the harness.
//!
//! Supports JSON and pretty-printed output, to stderr or to a file.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines, one object per event.
    Json,
    /// Human-readable output (default for interactive runs).
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(LogError::UnknownFormat(other.to_string())),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directive, e.g. "info" or "bcast_harness::fault=debug".
    pub level: String,
    /// Log to this file instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Unknown log format: {0}")]
    UnknownFormat(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    // RUST_LOG, when set and valid, wins over the configured level.
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| LogError::InvalidFilter(e.to_string()))?,
    };
    let registry = tracing_subscriber::registry().with(filter);

    let result = match (&config.output_path, config.format) {
        (Some(path), format) => {
            let file = std::fs::File::create(path).map_err(|e| LogError::FileOpen(e.to_string()))?;
            let writer = std::sync::Mutex::new(file);
            match format {
                LogFormat::Json => registry
                    .with(fmt::layer().json().with_writer(writer))
                    .try_init(),
                LogFormat::Pretty => registry
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .try_init(),
            }
        }
        (None, LogFormat::Json) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (None, LogFormat::Pretty) => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|_| LogError::AlreadyInitialized)
}
