//! Tier Policy Evaluation
//!
//! Turns the raw policy attributes of a resource into a typed [`TierPolicy`].
//!
//! Attributes are looked up on the leaf resource first, then on the tier
//! member (the coordinating resource named in the group), so a policy set on
//! a coordinating resource covers all of its leaves and a leaf can override it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::TieringConfig;
use crate::error::{TieringError, TieringResult};
use crate::metadata::MetadataAccessor;

/// How long an object may sit on a tier without being accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionTime {
    /// Objects older than this many seconds violate the policy
    Seconds(u64),
    /// Objects never age out of this tier
    Never,
}

impl RetentionTime {
    /// Access-time cutoff for a run at `now`; `None` when nothing can age out
    pub fn cutoff(&self, now: i64) -> Option<i64> {
        match self {
            RetentionTime::Seconds(secs) => {
                Some(now.saturating_sub(i64::try_from(*secs).unwrap_or(i64::MAX)))
            }
            RetentionTime::Never => None,
        }
    }
}

impl FromStr for RetentionTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("never") {
            return Ok(RetentionTime::Never);
        }
        s.parse::<u64>()
            .map(RetentionTime::Seconds)
            .map_err(|e| format!("expected seconds or \"never\": {}", e))
    }
}

impl fmt::Display for RetentionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionTime::Seconds(secs) => write!(f, "{}s", secs),
            RetentionTime::Never => write!(f, "never"),
        }
    }
}

/// Verification the transfer executor performs after a migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    /// Trust the transfer
    None,
    /// Compare catalog size against the destination
    Catalog,
    /// Compare on-disk size against the catalog
    Filesystem,
    /// Recompute and compare checksums
    Checksum,
}

impl VerificationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMode::None => "none",
            VerificationMode::Catalog => "catalog",
            VerificationMode::Filesystem => "filesystem",
            VerificationMode::Checksum => "checksum",
        }
    }
}

impl FromStr for VerificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(VerificationMode::None),
            "catalog" => Ok(VerificationMode::Catalog),
            "filesystem" => Ok(VerificationMode::Filesystem),
            "checksum" => Ok(VerificationMode::Checksum),
            other => Err(format!("unknown verification mode '{}'", other)),
        }
    }
}

impl fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the catalog executes a named violating query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Free-form query text with substituted tokens
    General,
    /// Pre-registered catalog query, invoked with bind arguments
    Specific,
}

/// A query template configured on a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolatingQuery {
    pub template: String,
    pub kind: QueryKind,
}

/// Typed policy for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub retention: RetentionTime,
    /// Cap on objects considered per run
    pub object_limit: NonZeroU32,
    /// Keep the source replica after migration
    pub preserve_replicas: bool,
    pub verification: VerificationMode,
    /// Opaque parameters for the transfer executor
    pub data_movement_params: String,
    /// This resource is where restaged objects go
    pub restage_target: bool,
    pub violating_queries: Vec<ViolatingQuery>,
    /// Resource the retention time was read from; leaves sharing it share
    /// one object limit
    #[serde(default)]
    pub policy_source: String,
}

/// Resources consulted for a policy, most specific first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyScope<'a> {
    /// Leaf resource holding the replicas
    pub leaf: &'a str,
    /// Tier member the leaf was expanded from
    pub member: &'a str,
}

impl<'a> PolicyScope<'a> {
    pub fn new(leaf: &'a str, member: &'a str) -> Self {
        Self { leaf, member }
    }

    /// Scope of a resource that is its own tier member
    pub fn single(resource: &'a str) -> Self {
        Self::new(resource, resource)
    }

    fn chain(&self) -> Vec<&'a str> {
        if self.leaf == self.member {
            vec![self.leaf]
        } else {
            vec![self.leaf, self.member]
        }
    }
}

/// Maps resource metadata to [`TierPolicy`] records
pub struct PolicyEvaluator<C: Catalog> {
    metadata: MetadataAccessor<C>,
    config: Arc<TieringConfig>,
}

impl<C: Catalog> PolicyEvaluator<C> {
    pub fn new(metadata: MetadataAccessor<C>, config: Arc<TieringConfig>) -> Self {
        Self { metadata, config }
    }

    /// Evaluate the policy for a scope.
    ///
    /// `Ok(None)` means no retention time is configured: the resource takes
    /// part in the topology but never triggers migrations.
    pub async fn evaluate(&self, scope: PolicyScope<'_>) -> TieringResult<Option<TierPolicy>> {
        let attrs = &self.config.attributes;

        let (policy_source, retention) = match self.lookup(&attrs.time, scope).await? {
            Some((resource, raw)) => {
                let retention = raw.parse::<RetentionTime>().map_err(|reason| {
                    TieringError::policy_parse(resource.as_str(), &attrs.time, &raw, reason)
                })?;
                (resource, retention)
            }
            None => return Ok(None),
        };

        let object_limit = match self.lookup(&attrs.object_limit, scope).await? {
            Some((resource, raw)) => parse_object_limit(&raw).map_err(|reason| {
                TieringError::policy_parse(resource, &attrs.object_limit, &raw, reason)
            })?,
            None => NonZeroU32::new(self.config.default_object_limit).ok_or_else(|| {
                TieringError::Configuration("default_object_limit must be greater than zero".into())
            })?,
        };

        let preserve_replicas = match self.lookup(&attrs.preserve_replicas, scope).await? {
            Some((resource, raw)) => parse_flag(&raw).map_err(|reason| {
                TieringError::policy_parse(resource, &attrs.preserve_replicas, &raw, reason)
            })?,
            None => false,
        };

        let verification = match self.lookup(&attrs.verification, scope).await? {
            Some((resource, raw)) => raw.parse::<VerificationMode>().map_err(|reason| {
                TieringError::policy_parse(resource, &attrs.verification, &raw, reason)
            })?,
            None => self.config.default_verification,
        };

        let data_movement_params = self
            .lookup(&attrs.data_movement_parameters, scope)
            .await?
            .map(|(_, raw)| raw)
            .unwrap_or_else(|| self.config.default_data_movement_params.clone());

        let restage_target = self.flag(&attrs.restage_target, scope).await?;
        let violating_queries = self.violating_queries(scope).await?;

        Ok(Some(TierPolicy {
            retention,
            object_limit,
            preserve_replicas,
            verification,
            data_movement_params,
            restage_target,
            violating_queries,
            policy_source,
        }))
    }

    /// Verification mode for migrations into or out of `resource`
    pub async fn verification_for(&self, scope: PolicyScope<'_>) -> TieringResult<VerificationMode> {
        let attribute = &self.config.attributes.verification;
        match self.lookup(attribute, scope).await? {
            Some((resource, raw)) => raw
                .parse::<VerificationMode>()
                .map_err(|reason| TieringError::policy_parse(resource, attribute, &raw, reason)),
            None => Ok(self.config.default_verification),
        }
    }

    /// Data movement parameters for migrations into `resource`
    pub async fn data_movement_params_for(&self, scope: PolicyScope<'_>) -> TieringResult<String> {
        Ok(self
            .lookup(&self.config.attributes.data_movement_parameters, scope)
            .await?
            .map(|(_, raw)| raw)
            .unwrap_or_else(|| self.config.default_data_movement_params.clone()))
    }

    /// Whether `resource` is flagged as the restage target of its group
    pub async fn is_restage_target(&self, resource: &str) -> TieringResult<bool> {
        self.flag(&self.config.attributes.restage_target, PolicyScope::single(resource))
            .await
    }

    /// First value of `attribute` along the scope, with the resource it came from
    async fn lookup(
        &self,
        attribute: &str,
        scope: PolicyScope<'_>,
    ) -> TieringResult<Option<(String, String)>> {
        for resource in scope.chain() {
            if let Some(value) = self.metadata.get_value(attribute, resource).await? {
                return Ok(Some((resource.to_string(), value)));
            }
        }
        Ok(None)
    }

    async fn flag(&self, attribute: &str, scope: PolicyScope<'_>) -> TieringResult<bool> {
        match self.lookup(attribute, scope).await? {
            Some((resource, raw)) => parse_flag(&raw)
                .map_err(|reason| TieringError::policy_parse(resource, attribute, &raw, reason)),
            None => Ok(false),
        }
    }

    async fn violating_queries(&self, scope: PolicyScope<'_>) -> TieringResult<Vec<ViolatingQuery>> {
        let attribute = &self.config.attributes.query;
        for resource in scope.chain() {
            let entries = self.metadata.get_all(attribute, resource).await?;
            if !entries.is_empty() {
                return Ok(entries
                    .into_iter()
                    .map(|e| ViolatingQuery {
                        kind: if e.unit.trim().eq_ignore_ascii_case("specific") {
                            QueryKind::Specific
                        } else {
                            QueryKind::General
                        },
                        template: e.value,
                    })
                    .collect());
            }
        }
        Ok(Vec::new())
    }
}

fn parse_object_limit(raw: &str) -> Result<NonZeroU32, String> {
    let limit: u32 = raw
        .trim()
        .parse()
        .map_err(|e| format!("expected a positive integer: {}", e))?;
    NonZeroU32::new(limit).ok_or_else(|| "object limit must be greater than zero".to_string())
}

fn parse_flag(raw: &str) -> Result<bool, String> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("expected a boolean, got '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogFixture, InMemoryCatalog};
    use crate::config::AttributeNames;

    fn evaluator(fixture: CatalogFixture) -> PolicyEvaluator<InMemoryCatalog> {
        let catalog = Arc::new(InMemoryCatalog::from_fixture(fixture));
        PolicyEvaluator::new(
            MetadataAccessor::new(catalog),
            Arc::new(TieringConfig::default()),
        )
    }

    fn attrs() -> AttributeNames {
        AttributeNames::default()
    }

    #[test]
    fn test_retention_parsing() {
        assert_eq!("60".parse::<RetentionTime>(), Ok(RetentionTime::Seconds(60)));
        assert_eq!(" NEVER ".parse::<RetentionTime>(), Ok(RetentionTime::Never));
        assert!("abc".parse::<RetentionTime>().is_err());
        assert!("-5".parse::<RetentionTime>().is_err());
    }

    #[test]
    fn test_retention_cutoff() {
        assert_eq!(RetentionTime::Seconds(60).cutoff(1000), Some(940));
        assert_eq!(RetentionTime::Never.cutoff(1000), None);
        assert_eq!(RetentionTime::Seconds(u64::MAX).cutoff(0), Some(-i64::MAX));
    }

    #[test]
    fn test_flag_parsing() {
        assert_eq!(parse_flag("TRUE"), Ok(true));
        assert_eq!(parse_flag("no"), Ok(false));
        assert!(parse_flag("maybe").is_err());
    }

    #[tokio::test]
    async fn test_no_retention_means_no_policy() {
        let evaluator = evaluator(CatalogFixture::new().with_resource("fast"));
        assert_eq!(evaluator.evaluate(PolicyScope::single("fast")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_defaults_applied() {
        let fixture = CatalogFixture::new().with_resource_metadata("fast", &attrs().time, "60", "");
        let policy = evaluator(fixture)
            .evaluate(PolicyScope::single("fast"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(policy.retention, RetentionTime::Seconds(60));
        assert_eq!(policy.object_limit.get(), crate::config::DEFAULT_OBJECT_LIMIT);
        assert!(!policy.preserve_replicas);
        assert_eq!(policy.verification, VerificationMode::Catalog);
        assert_eq!(policy.data_movement_params, crate::config::DEFAULT_DATA_MOVEMENT_PARAMS);
        assert!(policy.violating_queries.is_empty());
    }

    #[tokio::test]
    async fn test_full_policy() {
        let a = attrs();
        let fixture = CatalogFixture::new()
            .with_resource_metadata("fast", &a.time, "never", "")
            .with_resource_metadata("fast", &a.object_limit, "25", "")
            .with_resource_metadata("fast", &a.preserve_replicas, "true", "")
            .with_resource_metadata("fast", &a.verification, "checksum", "")
            .with_resource_metadata("fast", &a.data_movement_parameters, "<EF>1h</EF>", "")
            .with_resource_metadata("fast", &a.query, "SELECT 1", "")
            .with_resource_metadata("fast", &a.query, "archive_q", "specific");
        let policy = evaluator(fixture)
            .evaluate(PolicyScope::single("fast"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(policy.retention, RetentionTime::Never);
        assert_eq!(policy.object_limit.get(), 25);
        assert!(policy.preserve_replicas);
        assert_eq!(policy.verification, VerificationMode::Checksum);
        assert_eq!(policy.data_movement_params, "<EF>1h</EF>");
        assert_eq!(policy.violating_queries.len(), 2);
        assert_eq!(policy.violating_queries[1].kind, QueryKind::Specific);
    }

    #[tokio::test]
    async fn test_malformed_retention_is_policy_parse_error() {
        let fixture = CatalogFixture::new().with_resource_metadata("fast", &attrs().time, "abc", "");
        let err = evaluator(fixture)
            .evaluate(PolicyScope::single("fast"))
            .await
            .unwrap_err();

        match err {
            TieringError::PolicyParse { resource, value, .. } => {
                assert_eq!(resource, "fast");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_zero_object_limit_rejected() {
        let a = attrs();
        let fixture = CatalogFixture::new()
            .with_resource_metadata("fast", &a.time, "60", "")
            .with_resource_metadata("fast", &a.object_limit, "0", "");
        let err = evaluator(fixture)
            .evaluate(PolicyScope::single("fast"))
            .await
            .unwrap_err();
        assert!(matches!(err, TieringError::PolicyParse { .. }));
    }

    #[tokio::test]
    async fn test_leaf_overrides_member() {
        let a = attrs();
        let fixture = CatalogFixture::new()
            .with_child("repl", "disk_a")
            .with_resource_metadata("repl", &a.time, "600", "")
            .with_resource_metadata("repl", &a.verification, "filesystem", "")
            .with_resource_metadata("disk_a", &a.time, "60", "");
        let policy = evaluator(fixture)
            .evaluate(PolicyScope::new("disk_a", "repl"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(policy.retention, RetentionTime::Seconds(60));
        assert_eq!(policy.verification, VerificationMode::Filesystem);
        assert_eq!(policy.policy_source, "disk_a");
    }

    #[tokio::test]
    async fn test_member_policy_source() {
        let fixture = CatalogFixture::new()
            .with_child("repl", "disk_a")
            .with_resource_metadata("repl", &attrs().time, "600", "");
        let policy = evaluator(fixture)
            .evaluate(PolicyScope::new("disk_a", "repl"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(policy.policy_source, "repl");
    }

    #[tokio::test]
    async fn test_restage_flag() {
        let fixture = CatalogFixture::new()
            .with_resource_metadata("fast", &attrs().restage_target, "true", "")
            .with_resource("slow");
        let evaluator = evaluator(fixture);
        assert!(evaluator.is_restage_target("fast").await.unwrap());
        assert!(!evaluator.is_restage_target("slow").await.unwrap());
    }
}
