//! Tiering Engine Configuration
//!
//! Attribute names, policy defaults and dispatch settings.
//! Supports loading overrides from environment variables with the `TIERING_` prefix.

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::{TieringError, TieringResult};
use crate::policy::VerificationMode;

/// Object limit applied when a resource does not configure one
pub const DEFAULT_OBJECT_LIMIT: u32 = 1000;

/// Retry parameters handed to the transfer executor when a resource has none
pub const DEFAULT_DATA_MOVEMENT_PARAMS: &str = "<EF>60s DOUBLE UNTIL SUCCESS OR 5 TIMES</EF>";

/// Queue (plugin instance) that receives migration jobs
pub const DEFAULT_QUEUE_NAME: &str = "storage-tiering";

/// Metadata attribute names read and written by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeNames {
    /// Group membership; value is the group name, unit the tier index
    pub group: String,
    /// Retention time in seconds, or "never"
    pub time: String,
    pub object_limit: String,
    pub preserve_replicas: String,
    pub verification: String,
    pub data_movement_parameters: String,
    /// Marks the resource objects are restaged to
    pub restage_target: String,
    /// Named violating query templates (zero or more)
    pub query: String,
    /// Last access time of a data object, epoch seconds
    pub access_time: String,
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            group: "irods::storage_tiering::group".to_string(),
            time: "irods::storage_tiering::time".to_string(),
            object_limit: "irods::storage_tiering::object_limit".to_string(),
            preserve_replicas: "irods::storage_tiering::preserve_replicas".to_string(),
            verification: "irods::storage_tiering::verification".to_string(),
            data_movement_parameters: "irods::storage_tiering::data_movement_parameters"
                .to_string(),
            restage_target: "irods::storage_tiering::minimum_restage_tier".to_string(),
            query: "irods::storage_tiering::query".to_string(),
            access_time: "irods::access_time".to_string(),
        }
    }
}

impl AttributeNames {
    fn all(&self) -> [(&'static str, &str); 9] {
        [
            ("group", &self.group),
            ("time", &self.time),
            ("object_limit", &self.object_limit),
            ("preserve_replicas", &self.preserve_replicas),
            ("verification", &self.verification),
            ("data_movement_parameters", &self.data_movement_parameters),
            ("restage_target", &self.restage_target),
            ("query", &self.query),
            ("access_time", &self.access_time),
        ]
    }
}

/// Tiering engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TieringConfig {
    /// Queue (plugin instance) migration jobs are submitted to
    pub queue_name: String,
    /// Metadata attribute names
    pub attributes: AttributeNames,
    /// Object limit when a resource sets none; never zero
    pub default_object_limit: u32,
    /// Verification mode when a resource sets none
    pub default_verification: VerificationMode,
    /// Data movement parameters when a resource sets none
    pub default_data_movement_params: String,
    /// Lower bound of the random submission delay (seconds)
    pub min_delay_secs: u64,
    /// Upper bound of the random submission delay (seconds)
    pub max_delay_secs: u64,
}

impl Default for TieringConfig {
    fn default() -> Self {
        Self {
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            attributes: AttributeNames::default(),
            default_object_limit: DEFAULT_OBJECT_LIMIT,
            default_verification: VerificationMode::Catalog,
            default_data_movement_params: DEFAULT_DATA_MOVEMENT_PARAMS.to_string(),
            min_delay_secs: 1,
            max_delay_secs: 30,
        }
    }
}

impl TieringConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - TIERING_QUEUE_NAME: queue receiving migration jobs
    /// - TIERING_DEFAULT_OBJECT_LIMIT: object limit for resources without one
    /// - TIERING_DEFAULT_VERIFICATION: none/catalog/filesystem/checksum
    /// - TIERING_DATA_MOVEMENT_PARAMS: default data movement parameters
    /// - TIERING_MIN_DELAY_SECS / TIERING_MAX_DELAY_SECS: submission delay window
    ///
    /// Unset or unparseable variables keep their defaults; call
    /// [`TieringConfig::validate`] on the result.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            queue_name: env::var("TIERING_QUEUE_NAME").unwrap_or(defaults.queue_name),
            attributes: defaults.attributes,
            default_object_limit: env::var("TIERING_DEFAULT_OBJECT_LIMIT")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.default_object_limit),
            default_verification: env::var("TIERING_DEFAULT_VERIFICATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_verification),
            default_data_movement_params: env::var("TIERING_DATA_MOVEMENT_PARAMS")
                .unwrap_or(defaults.default_data_movement_params),
            min_delay_secs: env::var("TIERING_MIN_DELAY_SECS")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.min_delay_secs),
            max_delay_secs: env::var("TIERING_MAX_DELAY_SECS")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.max_delay_secs),
        }
    }

    /// Set the queue name
    pub fn with_queue_name(mut self, name: &str) -> Self {
        self.queue_name = name.to_string();
        self
    }

    /// Set the submission delay window
    pub fn with_delay_window(mut self, min_secs: u64, max_secs: u64) -> Self {
        self.min_delay_secs = min_secs;
        self.max_delay_secs = max_secs;
        self
    }

    /// Set the default object limit
    pub fn with_default_object_limit(mut self, limit: u32) -> Self {
        self.default_object_limit = limit;
        self
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> TieringResult<()> {
        if self.queue_name.trim().is_empty() {
            return Err(TieringError::Configuration(
                "queue_name must not be empty".to_string(),
            ));
        }
        if self.default_object_limit == 0 {
            return Err(TieringError::Configuration(
                "default_object_limit must be greater than zero".to_string(),
            ));
        }
        if self.min_delay_secs > self.max_delay_secs {
            return Err(TieringError::Configuration(format!(
                "min_delay_secs ({}) exceeds max_delay_secs ({})",
                self.min_delay_secs, self.max_delay_secs
            )));
        }
        for (field, name) in self.attributes.all() {
            if name.trim().is_empty() {
                return Err(TieringError::Configuration(format!(
                    "attribute name '{}' must not be empty",
                    field
                )));
            }
        }
        Ok(())
    }
}
