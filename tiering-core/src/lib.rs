//! Storage Tiering Policy Engine
//!
//! Moves data objects between ordered storage tiers according to policy
//! metadata attached to storage resources.
//!
//! # Tier Groups
//!
//! A tier group is an ordered set of storage tiers. Membership is a metadata
//! entry on a resource (value = group name, unit = tier index); ascending
//! index means slower, cheaper storage. A sweep of a group finds, for every
//! tier but the last, the objects that outlived the tier's retention time and
//! hands one migration job per object to an external job queue.
//!
//! # Collaborators
//!
//! The engine owns no storage. It reads and writes a metadata [`Catalog`],
//! submits to a [`JobQueue`] and forwards schedules to a
//! [`ScheduleRegistrar`]. In-memory implementations of all three are provided.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use tiering_core::{
//!     CatalogFixture, HostContext, InMemoryCatalog, InMemoryJobQueue, StorageTiering,
//!     TieringConfig,
//! };
//!
//! async fn example() -> tiering_core::TieringResult<()> {
//!     let fixture = CatalogFixture::new()
//!         .with_tier("fast", "tiers", 0)
//!         .with_tier("slow", "tiers", 1);
//!     let context = HostContext::new(
//!         Arc::new(InMemoryCatalog::from_fixture(fixture)),
//!         Arc::new(InMemoryJobQueue::new()),
//!     );
//!
//!     let engine = StorageTiering::new(context, TieringConfig::default())?;
//!     let report = engine.run_policy_for_group("tiers").await?;
//!     println!("dispatched {} jobs", report.job_count());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod metadata;
pub mod policy;
pub mod queue;
pub mod schedule;
pub mod scheduler;
pub mod telemetry;
pub mod topology;
pub mod violation;

pub use catalog::{
    Catalog, CatalogFixture, InMemoryCatalog, MetadataEntry, ObjectFixture, ReplicaLocation,
    ResourceFixture, ResourceRecord,
};
pub use config::{
    AttributeNames, TieringConfig, DEFAULT_DATA_MOVEMENT_PARAMS, DEFAULT_OBJECT_LIMIT,
    DEFAULT_QUEUE_NAME,
};
pub use context::HostContext;
pub use dispatch::{DispatchedJob, JobHandle, JobSubmission, MigrationDispatcher, MigrationJob};
pub use error::{TieringError, TieringResult};
pub use metadata::MetadataAccessor;
pub use policy::{
    PolicyEvaluator, PolicyScope, QueryKind, RetentionTime, TierPolicy, VerificationMode,
    ViolatingQuery,
};
pub use queue::{InMemoryJobQueue, JobQueue, QueueMetrics};
pub use schedule::{parse_schedule, RecordingScheduleRegistrar, ScheduleRegistrar, ScheduleRequest};
pub use scheduler::{
    RestageOutcome, RestageRequest, StorageTiering, SweepIssue, SweepReport, SweepState,
};
pub use telemetry::{init_logging, LogConfig, LogFormat, LogLevel};
pub use topology::{GroupMembership, TierGroup, TierLevel, TopologyResolver};
pub use violation::{
    merge_violations, render_query, RenderedQuery, StaleReplicaQuery, Violation,
    ViolationQueryEngine,
};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
