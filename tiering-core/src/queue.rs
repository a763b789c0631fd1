//! Job Queue
//!
//! The asynchronous execution facility that runs migrations is external.
//! [`JobQueue`] is the submission side of it; [`InMemoryJobQueue`] records
//! submissions for tests and offline runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dispatch::{JobHandle, JobSubmission};
use crate::error::{TieringError, TieringResult};

/// Submission interface of the external job queue
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Accept a job for asynchronous execution; must not wait for it to run
    async fn submit(&self, submission: JobSubmission) -> TieringResult<JobHandle>;
}

/// Submission counters
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pub submitted: AtomicU64,
    pub rejected: AtomicU64,
}

/// Queue that keeps every accepted submission in memory
pub struct InMemoryJobQueue {
    submissions: RwLock<Vec<JobSubmission>>,
    rejected_paths: RwLock<HashSet<String>>,
    metrics: QueueMetrics,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            submissions: RwLock::new(Vec::new()),
            rejected_paths: RwLock::new(HashSet::new()),
            metrics: QueueMetrics::default(),
        }
    }

    /// Refuse submissions for `object_path`
    pub async fn reject_path(&self, object_path: &str) {
        self.rejected_paths
            .write()
            .await
            .insert(object_path.to_string());
    }

    /// Accepted submissions, in arrival order
    pub async fn submissions(&self) -> Vec<JobSubmission> {
        self.submissions.read().await.clone()
    }

    /// Accepted and rejected submission counts
    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn submit(&self, submission: JobSubmission) -> TieringResult<JobHandle> {
        if self
            .rejected_paths
            .read()
            .await
            .contains(&submission.job.object_path)
        {
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(TieringError::Dispatch(format!(
                "queue '{}' rejected job for {}",
                submission.queue, submission.job.object_path
            )));
        }

        let handle = JobHandle {
            job_id: Uuid::new_v4(),
            queue: submission.queue.clone(),
            idempotency_key: submission.idempotency_key.clone(),
            submitted_at: Utc::now(),
            delay_secs: submission.delay_secs,
        };

        self.submissions.write().await.push(submission);
        self.metrics.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }
}
