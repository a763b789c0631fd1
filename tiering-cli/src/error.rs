//! CLI Error Types

use thiserror::Error;
use tiering_core::TieringError;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// File I/O error
    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Engine error
    #[error("{0}")]
    TieringError(#[from] TieringError),

    /// One or more group sweeps failed
    #[error("Sweep failed for {} group(s): {}", groups.len(), groups.join(", "))]
    SweepFailed { groups: Vec<String> },
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        CliError::ConfigError {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_arg(message: impl Into<String>) -> Self {
        CliError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Get exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::ConfigError { .. } => 1,
            CliError::InvalidArgument { .. } => 2,
            CliError::IoError(_) => 5,
            CliError::JsonError(_) => 6,
            CliError::TieringError(e) => match e {
                TieringError::Catalog(_) => 10,
                TieringError::Topology(_) => 11,
                TieringError::PolicyParse { .. } => 12,
                TieringError::Dispatch(_) => 13,
                TieringError::ObjectNotFound(_) => 14,
                TieringError::Configuration(_) => 1,
                TieringError::Schedule(_) => 15,
            },
            CliError::SweepFailed { .. } => 20,
        }
    }
}
