//! Schedule Forwarding
//!
//! Deciding when a sweep runs belongs to an external cron/event facility.
//! The engine only validates a schedule request and forwards one
//! registration per tier group.
//!
//! Accepted rule spec:
//!
//! ```text
//! {
//!   "storage-tier-groups": ["group_a", "group_b"],
//!   "schedule": "0 */4 * * *",
//!   "delay-parameters": "<PLUSET>1s</PLUSET><EF>1h REPEAT FOR EVER</EF>"
//! }
//! ```
//!
//! `"group"` may be used instead of `"storage-tier-groups"` for a single
//! group; when `"schedule"` is absent the delay parameters are the schedule.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{TieringError, TieringResult};

/// One group's registration with the external scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub group: String,
    /// Schedule expression, passed through
    pub schedule: String,
    pub delay_parameters: Option<String>,
    /// Caller parameters, passed through
    pub params: Value,
}

/// External cron/event registration facility
#[async_trait]
pub trait ScheduleRegistrar: Send + Sync {
    /// Register a recurring sweep; returns the registration id
    async fn register(&self, request: ScheduleRequest) -> TieringResult<String>;
}

#[derive(Debug, Deserialize)]
struct RuleSpec {
    #[serde(rename = "storage-tier-groups", default)]
    groups: Vec<String>,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    schedule: Option<String>,
    #[serde(rename = "delay-parameters", default)]
    delay_parameters: Option<String>,
}

/// Parse a rule spec and its parameters into per-group requests
pub fn parse_schedule(json_rule_spec: &str, json_params: &str) -> TieringResult<Vec<ScheduleRequest>> {
    let spec: RuleSpec = serde_json::from_str(json_rule_spec)
        .map_err(|e| TieringError::Schedule(format!("invalid rule spec: {}", e)))?;

    let params = if json_params.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(json_params)
            .map_err(|e| TieringError::Schedule(format!("invalid parameters: {}", e)))?
    };

    let mut groups = spec.groups;
    if let Some(group) = spec.group {
        groups.push(group);
    }
    groups.retain(|g| !g.trim().is_empty());
    if groups.is_empty() {
        return Err(TieringError::Schedule(
            "rule spec names no storage tier groups".to_string(),
        ));
    }

    let schedule = spec
        .schedule
        .clone()
        .or_else(|| spec.delay_parameters.clone())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            TieringError::Schedule("rule spec has no schedule or delay-parameters".to_string())
        })?;

    Ok(groups
        .into_iter()
        .map(|group| ScheduleRequest {
            group,
            schedule: schedule.clone(),
            delay_parameters: spec.delay_parameters.clone(),
            params: params.clone(),
        })
        .collect())
}

/// Registrar that records requests in memory
#[derive(Default)]
pub struct RecordingScheduleRegistrar {
    requests: RwLock<Vec<ScheduleRequest>>,
}

impl RecordingScheduleRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn requests(&self) -> Vec<ScheduleRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl ScheduleRegistrar for RecordingScheduleRegistrar {
    async fn register(&self, request: ScheduleRequest) -> TieringResult<String> {
        self.requests.write().await.push(request);
        Ok(Uuid::new_v4().to_string())
    }
}
