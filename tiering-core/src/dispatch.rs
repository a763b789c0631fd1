//! Migration Dispatch
//!
//! Builds [`MigrationJob`] records and submits them to the external job
//! queue. Dispatch does not wait for the migration and keeps no job state:
//! an object whose submission fails stays a violation and is picked up again
//! on the next run.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::TieringConfig;
use crate::error::{TieringError, TieringResult};
use crate::policy::VerificationMode;
use crate::queue::JobQueue;

/// Request to move one object between leaf resources.
///
/// Field names are the submission contract with the transfer executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationJob {
    pub source_resource: String,
    pub destination_resource: String,
    pub object_path: String,
    pub verification_mode: VerificationMode,
    pub preserve_replicas: bool,
    /// Passed through to the executor untouched
    pub movement_params: String,
}

impl MigrationJob {
    /// Stable key identifying "move this object from here to there".
    ///
    /// Hex SHA-256 over path, source and destination; queues may use it to
    /// collapse duplicate in-flight submissions.
    pub fn idempotency_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.object_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.source_resource.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.destination_resource.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// What the dispatcher hands to the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmission {
    /// Queue (plugin instance) name
    pub queue: String,
    pub job: MigrationJob,
    /// Seconds the queue should hold the job before running it
    pub delay_secs: u64,
    pub idempotency_key: String,
}

/// Receipt for a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub queue: String,
    pub idempotency_key: String,
    pub submitted_at: DateTime<Utc>,
    pub delay_secs: u64,
}

/// A job together with the handle the queue returned for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchedJob {
    pub job: MigrationJob,
    pub handle: JobHandle,
}

/// Submits migration jobs to a [`JobQueue`]
pub struct MigrationDispatcher<Q: JobQueue> {
    queue: Arc<Q>,
    queue_name: String,
    min_delay_secs: u64,
    max_delay_secs: u64,
}

impl<Q: JobQueue> MigrationDispatcher<Q> {
    pub fn new(queue: Arc<Q>, config: &TieringConfig) -> Self {
        Self {
            queue,
            queue_name: config.queue_name.clone(),
            min_delay_secs: config.min_delay_secs,
            max_delay_secs: config.max_delay_secs.max(config.min_delay_secs),
        }
    }

    /// Submit a job; returns once the queue has accepted it
    pub async fn enqueue(&self, job: MigrationJob) -> TieringResult<DispatchedJob> {
        let submission = JobSubmission {
            queue: self.queue_name.clone(),
            idempotency_key: job.idempotency_key(),
            delay_secs: self.pick_delay(),
            job,
        };

        debug!(
            object_path = %submission.job.object_path,
            source = %submission.job.source_resource,
            destination = %submission.job.destination_resource,
            delay_secs = submission.delay_secs,
            "Submitting migration job"
        );

        let job = submission.job.clone();
        match self.queue.submit(submission).await {
            Ok(handle) => Ok(DispatchedJob { job, handle }),
            Err(e) => {
                warn!(
                    object_path = %job.object_path,
                    source = %job.source_resource,
                    error = %e,
                    "Migration job submission failed"
                );
                Err(match e {
                    TieringError::Dispatch(msg) => TieringError::Dispatch(msg),
                    other => TieringError::Dispatch(other.to_string()),
                })
            }
        }
    }

    /// Spread submissions over the configured window
    fn pick_delay(&self) -> u64 {
        if self.min_delay_secs == self.max_delay_secs {
            return self.min_delay_secs;
        }
        rand::thread_rng().gen_range(self.min_delay_secs..=self.max_delay_secs)
    }
}
