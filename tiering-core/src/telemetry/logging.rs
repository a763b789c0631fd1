//! Structured Logging
//!
//! Subscriber setup for hosts and the CLI. The engine itself only emits
//! `tracing` events with `group`, `resource`, `object_path` and `tier` fields;
//! installing a subscriber is the host's choice.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    prelude::*,
    EnvFilter,
};

use crate::error::{TieringError, TieringResult};

/// Log level
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty-printed for development
    #[default]
    Pretty,
    /// JSON for production
    Json,
    /// Compact single-line
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include source file/line
    pub include_source: bool,
    pub include_thread_id: bool,
    /// Emit span open/close events
    pub include_span_events: bool,
    /// Explicit filter directive (e.g. "tiering_core=debug"); overrides `level`
    pub filter: Option<String>,
    /// Crates the level applies to when no filter is given
    pub targets: Vec<String>,
    /// Write to stderr instead of stdout
    pub to_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            include_source: true,
            include_thread_id: false,
            include_span_events: false,
            filter: None,
            targets: vec!["tiering-core".to_string()],
            to_stderr: false,
        }
    }
}

impl LogConfig {
    /// JSON output at info level
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            include_source: false,
            include_thread_id: true,
            include_span_events: true,
            ..Self::default()
        }
    }

    /// Pretty output at debug level
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            ..Self::default()
        }
    }

    /// Read TIERING_LOG_LEVEL, TIERING_LOG_FORMAT and TIERING_LOG_FILTER over the defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: env::var("TIERING_LOG_LEVEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.level),
            format: env::var("TIERING_LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.format),
            filter: env::var("TIERING_LOG_FILTER").ok().filter(|s| !s.trim().is_empty()),
            ..defaults
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Keep stdout free for command output
    pub fn with_stderr(mut self) -> Self {
        self.to_stderr = true;
        self
    }

    /// Also apply the level to `target`
    pub fn with_target(mut self, target: &str) -> Self {
        if !self.targets.iter().any(|t| t == target) {
            self.targets.push(target.to_string());
        }
        self
    }

    /// Filter directive this configuration installs
    pub fn directive(&self) -> String {
        match &self.filter {
            Some(filter) => filter.clone(),
            None => self
                .targets
                .iter()
                .map(|t| format!("{}={}", t.replace('-', "_"), self.level))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Install a global subscriber for `config`
pub fn init_logging(config: &LogConfig) -> TieringResult<()> {
    let filter = EnvFilter::try_new(config.directive())
        .map_err(|e| TieringError::Configuration(format!("invalid log filter: {}", e)))?;

    let span_events = if config.include_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let writer = if config.to_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };

    let installed = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_span_events(span_events)
                    .with_thread_ids(config.include_thread_id)
                    .with_file(config.include_source)
                    .with_line_number(config.include_source),
            ),
        ),
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .pretty()
                    .with_writer(writer)
                    .with_span_events(span_events)
                    .with_thread_ids(config.include_thread_id)
                    .with_file(config.include_source)
                    .with_line_number(config.include_source),
            ),
        ),
        LogFormat::Compact => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .compact()
                    .with_writer(writer)
                    .with_span_events(span_events)
                    .with_thread_ids(config.include_thread_id)
                    .with_file(config.include_source)
                    .with_line_number(config.include_source),
            ),
        ),
    };

    installed.map_err(|e| TieringError::Configuration(format!("logging already initialized: {}", e)))
}
