//! Tiering Error Types

use thiserror::Error;

/// Storage tiering errors
#[derive(Debug, Error)]
pub enum TieringError {
    /// Metadata catalog unreachable or query malformed
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Inconsistent or missing group/resource/tier configuration
    #[error("Topology error: {0}")]
    Topology(String),

    /// Malformed policy attribute on a single resource
    #[error("Policy parse error on resource '{resource}': {attribute}={value:?}: {reason}")]
    PolicyParse {
        resource: String,
        attribute: String,
        value: String,
        reason: String,
    },

    /// Job queue submission failed
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Data object has no replica the engine can locate
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Engine configuration rejected
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Schedule request malformed or rejected by the registrar
    #[error("Schedule error: {0}")]
    Schedule(String),
}

impl TieringError {
    /// Create a policy parse error
    pub fn policy_parse(
        resource: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        TieringError::PolicyParse {
            resource: resource.into(),
            attribute: attribute.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error ends the current group sweep.
    ///
    /// Policy and dispatch failures are scoped to one resource or one object
    /// and the sweep moves on; everything else aborts.
    pub fn aborts_sweep(&self) -> bool {
        !matches!(
            self,
            TieringError::PolicyParse { .. } | TieringError::Dispatch(_)
        )
    }

    /// Short machine-readable kind, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            TieringError::Catalog(_) => "catalog",
            TieringError::Topology(_) => "topology",
            TieringError::PolicyParse { .. } => "policy_parse",
            TieringError::Dispatch(_) => "dispatch",
            TieringError::ObjectNotFound(_) => "object_not_found",
            TieringError::Configuration(_) => "configuration",
            TieringError::Schedule(_) => "schedule",
        }
    }
}

/// Tiering result type
pub type TieringResult<T> = Result<T, TieringError>;
