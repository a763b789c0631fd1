//! Storage Tiering Scheduler
//!
//! Entry points of the engine. A group sweep resolves the group's tiers,
//! evaluates the policy of every leaf in every non-terminal tier, finds its
//! violations and dispatches one migration job per violating object to the
//! first leaf of the next tier. Leaves whose policy is read from the same
//! resource share that resource's object limit.
//!
//! A sweep moves through
//! `Resolving -> Evaluating -> Querying -> Dispatching -> Done`, or to
//! `Failed` from any state. Policy and dispatch failures are scoped to a
//! resource or an object and are recorded in the [`SweepReport`]; catalog and
//! topology failures end the sweep.
//!
//! Nothing is cached between invocations: the topology and every policy are
//! re-read from the catalog on each call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::{Catalog, MetadataEntry};
use crate::config::TieringConfig;
use crate::context::HostContext;
use crate::dispatch::{DispatchedJob, MigrationDispatcher, MigrationJob};
use crate::error::{TieringError, TieringResult};
use crate::metadata::MetadataAccessor;
use crate::policy::{PolicyEvaluator, PolicyScope, TierPolicy};
use crate::queue::JobQueue;
use crate::schedule::parse_schedule;
use crate::topology::{TierGroup, TierLevel, TopologyResolver};
use crate::violation::{merge_violations, Violation, ViolationQueryEngine};

/// Position of a group sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SweepState {
    Resolving,
    Evaluating {
        source_tier: u32,
        destination_tier: u32,
    },
    Querying {
        resource: String,
    },
    Dispatching {
        resource: String,
    },
    Done,
    Failed {
        reason: String,
    },
}

impl SweepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SweepState::Done | SweepState::Failed { .. })
    }
}

/// A resource- or object-scoped failure the sweep continued past
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepIssue {
    pub resource: String,
    pub object_path: Option<String>,
    pub error: String,
}

/// Outcome of one group sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub run_id: String,
    pub group: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub state: SweepState,
    /// Tiers in the resolved group
    pub tiers: usize,
    /// Leaves of non-terminal tiers whose policy was read
    pub resources_evaluated: usize,
    /// Leaves without a retention time
    pub resources_without_policy: usize,
    pub violations_found: usize,
    pub policy_errors: Vec<SweepIssue>,
    pub dispatch_errors: Vec<SweepIssue>,
    pub jobs: Vec<DispatchedJob>,
}

impl SweepReport {
    fn new(group: &str) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            group: group.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            state: SweepState::Resolving,
            tiers: 0,
            resources_evaluated: 0,
            resources_without_policy: 0,
            violations_found: 0,
            policy_errors: Vec::new(),
            dispatch_errors: Vec::new(),
            jobs: Vec::new(),
        }
    }

    fn transition(&mut self, next: SweepState) {
        debug!(group = %self.group, from = ?self.state, to = ?next, "Sweep state transition");
        self.state = next;
        if self.state.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Finished without resource- or object-scoped failures
    pub fn is_clean(&self) -> bool {
        self.state == SweepState::Done
            && self.policy_errors.is_empty()
            && self.dispatch_errors.is_empty()
    }
}

/// Request to bring an object back to the fastest tier of its group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestageRequest {
    pub object_path: String,
    /// Leaf the object is read from; defaults to its first replica
    pub source_resource: Option<String>,
}

impl RestageRequest {
    pub fn new(object_path: &str) -> Self {
        Self {
            object_path: object_path.to_string(),
            source_resource: None,
        }
    }

    pub fn from_resource(object_path: &str, source_resource: &str) -> Self {
        Self {
            object_path: object_path.to_string(),
            source_resource: Some(source_resource.to_string()),
        }
    }
}

/// Result of a restage request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestageOutcome {
    /// A replica already sits on the destination tier; nothing dispatched
    AlreadyResident { resource: String },
    Dispatched(DispatchedJob),
}

/// Storage tiering engine
pub struct StorageTiering<C: Catalog, Q: JobQueue> {
    context: HostContext<C, Q>,
    config: Arc<TieringConfig>,
    metadata: MetadataAccessor<C>,
    topology: TopologyResolver<C>,
    policies: PolicyEvaluator<C>,
    violations: ViolationQueryEngine<C>,
    dispatcher: MigrationDispatcher<Q>,
}

impl<C: Catalog, Q: JobQueue> StorageTiering<C, Q> {
    /// Create an engine over the host's collaborators
    pub fn new(context: HostContext<C, Q>, config: TieringConfig) -> TieringResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let metadata = MetadataAccessor::new(context.catalog.clone());

        Ok(Self {
            topology: TopologyResolver::new(context.catalog.clone(), &config.attributes.group),
            policies: PolicyEvaluator::new(metadata.clone(), config.clone()),
            violations: ViolationQueryEngine::new(
                context.catalog.clone(),
                &config.attributes.access_time,
            ),
            dispatcher: MigrationDispatcher::new(context.queue.clone(), &config),
            metadata,
            context,
            config,
        })
    }

    pub fn config(&self) -> &TieringConfig {
        &self.config
    }

    pub fn context(&self) -> &HostContext<C, Q> {
        &self.context
    }

    /// Resolve a tier group without sweeping it
    pub async fn resolve_topology(&self, group: &str) -> TieringResult<TierGroup> {
        self.topology.resolve(group).await
    }

    /// Sweep one tier group as of now
    pub async fn run_policy_for_group(&self, group: &str) -> TieringResult<SweepReport> {
        self.run_policy_for_group_at(group, Utc::now().timestamp())
            .await
    }

    /// Sweep one tier group as of `now` (epoch seconds)
    pub async fn run_policy_for_group_at(&self, group: &str, now: i64) -> TieringResult<SweepReport> {
        let mut report = SweepReport::new(group);
        info!(group, run_id = %report.run_id, "Starting tier group sweep");

        let tiers = match self.topology.resolve(group).await {
            Ok(tiers) => tiers,
            Err(e) => return Err(self.abort(report, e)),
        };
        report.tiers = tiers.tier_count();

        for (source, destination) in tiers.transitions() {
            report.transition(SweepState::Evaluating {
                source_tier: source.index,
                destination_tier: destination.index,
            });

            let Some(destination_leaf) = destination.first_leaf() else {
                let e = TieringError::Topology(format!(
                    "tier {} of group '{}' has no leaf resources",
                    destination.index, group
                ));
                return Err(self.abort(report, e));
            };

            if let Err(e) = self
                .sweep_tier(&mut report, source, &destination_leaf, now)
                .await
            {
                return Err(self.abort(report, e));
            }
        }

        report.transition(SweepState::Done);
        info!(
            group,
            run_id = %report.run_id,
            tiers = report.tiers,
            resources = report.resources_evaluated,
            violations = report.violations_found,
            jobs = report.jobs.len(),
            policy_errors = report.policy_errors.len(),
            dispatch_errors = report.dispatch_errors.len(),
            "Tier group sweep complete"
        );

        Ok(report)
    }

    /// Sweep several groups in order; a failed group does not stop the rest
    pub async fn run_policy_for_groups(
        &self,
        groups: &[&str],
    ) -> Vec<(String, TieringResult<SweepReport>)> {
        let mut results = Vec::with_capacity(groups.len());
        for group in groups {
            results.push((group.to_string(), self.run_policy_for_group(group).await));
        }
        results
    }

    async fn sweep_tier(
        &self,
        report: &mut SweepReport,
        source: &TierLevel,
        destination_leaf: &str,
        now: i64,
    ) -> TieringResult<()> {
        for (member, leaves) in &source.members {
            let mut policies: HashMap<String, TierPolicy> = HashMap::new();
            let mut pools: BTreeMap<String, LimitPool> = BTreeMap::new();

            for leaf in leaves {
                report.resources_evaluated += 1;

                let policy = match self.policies.evaluate(PolicyScope::new(leaf, member)).await {
                    Ok(Some(policy)) => policy,
                    Ok(None) => {
                        debug!(group = %report.group, resource = %leaf, "No retention policy, skipping");
                        report.resources_without_policy += 1;
                        continue;
                    }
                    Err(e) if !e.aborts_sweep() => {
                        warn!(
                            group = %report.group,
                            resource = %leaf,
                            tier = source.index,
                            error = %e,
                            "Skipping resource with malformed policy"
                        );
                        report.policy_errors.push(SweepIssue {
                            resource: leaf.clone(),
                            object_path: None,
                            error: e.to_string(),
                        });
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                report.transition(SweepState::Querying {
                    resource: leaf.clone(),
                });
                let found = self
                    .violations
                    .find_violations_at(leaf, &policy, now)
                    .await?;
                pools
                    .entry(policy.policy_source.clone())
                    .or_default()
                    .add(leaf, &policy, found);
                policies.insert(leaf.clone(), policy);
            }

            for (owner, pool) in pools {
                let violations = pool.into_violations();
                report.violations_found += violations.len();

                report.transition(SweepState::Dispatching { resource: owner });
                for violation in violations {
                    let Some(policy) = policies.get(&violation.resource) else {
                        continue;
                    };
                    let job = MigrationJob {
                        source_resource: violation.resource.clone(),
                        destination_resource: destination_leaf.to_string(),
                        object_path: violation.object_path,
                        verification_mode: policy.verification,
                        preserve_replicas: policy.preserve_replicas,
                        movement_params: policy.data_movement_params.clone(),
                    };
                    let object_path = job.object_path.clone();

                    match self.dispatcher.enqueue(job).await {
                        Ok(dispatched) => report.jobs.push(dispatched),
                        Err(e) => report.dispatch_errors.push(SweepIssue {
                            resource: violation.resource,
                            object_path: Some(object_path),
                            error: e.to_string(),
                        }),
                    }
                }
            }
        }
        Ok(())
    }

    fn abort(&self, mut report: SweepReport, e: TieringError) -> TieringError {
        report.transition(SweepState::Failed {
            reason: e.to_string(),
        });
        let dispatched: Vec<&str> = report
            .jobs
            .iter()
            .map(|j| j.job.object_path.as_str())
            .collect();
        error!(
            group = %report.group,
            run_id = %report.run_id,
            kind = e.kind(),
            error = %e,
            dispatched = ?dispatched,
            "Tier group sweep aborted"
        );
        e
    }

    /// Violations on a resource as of now
    pub async fn find_violations(&self, resource: &str) -> TieringResult<Vec<Violation>> {
        self.find_violations_at(resource, Utc::now().timestamp())
            .await
    }

    /// Violations on a resource as of `now`.
    ///
    /// A coordinating resource is expanded to its leaves. Leaves whose policy
    /// comes from the same resource share its object limit, and the combined
    /// result is capped by the limit that applies to `resource` itself.
    pub async fn find_violations_at(&self, resource: &str, now: i64) -> TieringResult<Vec<Violation>> {
        let member = self
            .topology
            .group_for_resource(resource)
            .await?
            .map(|m| m.member)
            .unwrap_or_else(|| resource.to_string());

        let mut pools: BTreeMap<String, LimitPool> = BTreeMap::new();
        for leaf in self.topology.leaves_of(resource).await? {
            let Some(policy) = self.policies.evaluate(PolicyScope::new(&leaf, &member)).await? else {
                continue;
            };
            let found = self.violations.find_violations_at(&leaf, &policy, now).await?;
            pools
                .entry(policy.policy_source.clone())
                .or_default()
                .add(&leaf, &policy, found);
        }

        let rows: Vec<Violation> = pools
            .into_values()
            .flat_map(LimitPool::into_violations)
            .collect();
        let limit = match self.policies.evaluate(PolicyScope::new(resource, &member)).await? {
            Some(policy) => policy.object_limit.get() as usize,
            None => rows.len(),
        };
        Ok(merge_violations(rows, limit))
    }

    /// Dispatch a migration of an object back to its group's restage tier
    pub async fn restage(&self, request: RestageRequest) -> TieringResult<RestageOutcome> {
        let object_path = request.object_path.as_str();
        let replicas = self.context.catalog.object_replicas(object_path).await?;

        let source = match request.source_resource {
            Some(source) if replicas.iter().any(|r| r.resource == source) => source,
            Some(source) => {
                return Err(TieringError::ObjectNotFound(format!(
                    "{} has no replica on '{}'",
                    object_path, source
                )))
            }
            None => replicas
                .first()
                .map(|r| r.resource.clone())
                .ok_or_else(|| TieringError::ObjectNotFound(object_path.to_string()))?,
        };

        let membership = self
            .topology
            .group_for_resource(&source)
            .await?
            .ok_or_else(|| {
                TieringError::Topology(format!("resource '{}' is not in a tier group", source))
            })?;
        let tiers = self.topology.resolve(&membership.group).await?;
        let (level, member) = self.restage_destination(&tiers).await?;

        let resident = std::iter::once(source.as_str())
            .chain(replicas.iter().map(|r| r.resource.as_str()))
            .find(|r| level.contains_leaf(r));
        if let Some(resource) = resident {
            info!(
                object_path,
                group = %tiers.name,
                resource,
                tier = level.index,
                "Object already resident on restage tier"
            );
            return Ok(RestageOutcome::AlreadyResident {
                resource: resource.to_string(),
            });
        }

        let destination = level
            .members
            .get(&member)
            .and_then(|leaves| leaves.iter().next())
            .cloned()
            .ok_or_else(|| {
                TieringError::Topology(format!("restage member '{}' has no leaf resources", member))
            })?;

        let scope = PolicyScope::new(&destination, &member);
        let job = MigrationJob {
            source_resource: source,
            destination_resource: destination.clone(),
            object_path: object_path.to_string(),
            verification_mode: self.policies.verification_for(scope).await?,
            preserve_replicas: false,
            movement_params: self.policies.data_movement_params_for(scope).await?,
        };

        let dispatched = self.dispatcher.enqueue(job).await?;
        info!(
            object_path,
            group = %tiers.name,
            source = %dispatched.job.source_resource,
            destination = %destination,
            "Restage dispatched"
        );
        Ok(RestageOutcome::Dispatched(dispatched))
    }

    /// Tier and member restaged objects go to: the flagged member, else the
    /// first member of the minimum tier
    async fn restage_destination<'a>(
        &self,
        tiers: &'a TierGroup,
    ) -> TieringResult<(&'a TierLevel, String)> {
        for level in tiers.levels.values() {
            for member in level.members.keys() {
                if self.policies.is_restage_target(member).await? {
                    return Ok((level, member.clone()));
                }
            }
        }

        let level = tiers.minimum_level().ok_or_else(|| {
            TieringError::Topology(format!("tier group '{}' has no tiers", tiers.name))
        })?;
        let member = level.members.keys().next().cloned().ok_or_else(|| {
            TieringError::Topology(format!(
                "tier {} of group '{}' has no members",
                level.index, tiers.name
            ))
        })?;
        Ok((level, member))
    }

    /// Record an access to an object as of now; returns the stored time
    pub async fn update_access_time(&self, object_path: &str) -> TieringResult<i64> {
        self.update_access_time_at(object_path, Utc::now().timestamp())
            .await
    }

    /// Record an access as of `now`; the stored time never moves backwards
    pub async fn update_access_time_at(&self, object_path: &str, now: i64) -> TieringResult<i64> {
        let attribute = &self.config.attributes.access_time;
        let existing = self
            .metadata
            .get_for_object(attribute, object_path)
            .await?
            .and_then(|entry| entry.value.trim().parse::<i64>().ok());
        let access_time = existing.map_or(now, |t| t.max(now));

        self.context
            .catalog
            .set_object_metadata(
                object_path,
                MetadataEntry::new(attribute, &access_time.to_string()),
            )
            .await?;

        debug!(object_path, access_time, "Access time updated");
        Ok(access_time)
    }

    /// Forward a schedule rule to the registrar; returns registration ids
    pub async fn schedule(&self, json_rule_spec: &str, json_params: &str) -> TieringResult<Vec<String>> {
        let registrar = self.context.registrar.as_ref().ok_or_else(|| {
            TieringError::Schedule("no schedule registrar configured".to_string())
        })?;

        let requests = parse_schedule(json_rule_spec, json_params)?;
        let mut ids = Vec::with_capacity(requests.len());
        for request in requests {
            let group = request.group.clone();
            let id = registrar.register(request).await?;
            info!(group = %group, registration = %id, "Tier group sweep scheduled");
            ids.push(id);
        }
        Ok(ids)
    }
}

/// Violations of the leaves that share one object limit
#[derive(Debug, Default)]
struct LimitPool {
    limit: Option<usize>,
    rows: Vec<Violation>,
}

impl LimitPool {
    /// Add a leaf's violations; the pool keeps the smallest limit it has seen
    fn add(&mut self, leaf: &str, policy: &TierPolicy, found: Vec<Violation>) {
        let limit = policy.object_limit.get() as usize;
        self.limit = Some(self.limit.map_or(limit, |l| l.min(limit)));
        self.rows.extend(found.into_iter().map(|mut v| {
            v.resource = leaf.to_string();
            v
        }));
    }

    /// Most overdue first, capped once for the whole pool
    fn into_violations(self) -> Vec<Violation> {
        merge_violations(self.rows, self.limit.unwrap_or(0))
    }
}
