//! Violation Query Engine
//!
//! Finds the objects on a resource that exceed its retention policy.
//!
//! Two sources feed the result:
//! - the time predicate: replica on the resource and access time older than
//!   `now - retention`
//! - named violating queries configured on the resource, rendered from their
//!   templates and executed by the catalog
//!
//! Results are unioned by object path, ordered most overdue first and capped at
//! the resource's object limit, so repeated runs walk the same backlog in the
//! same order.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::Catalog;
use crate::error::TieringResult;
use crate::policy::{QueryKind, TierPolicy, ViolatingQuery};

/// Replaced by the access-time cutoff (epoch seconds)
pub const TIME_CHECK_TOKEN: &str = "TIME_CHECK_STRING";
/// Replaced by the quoted, comma separated leaf resource names
pub const RESOURCE_ID_LIST_TOKEN: &str = "RESOURCE_ID_LIST";
/// Alias of [`RESOURCE_ID_LIST_TOKEN`]
pub const RESOURCE_NAME_LIST_TOKEN: &str = "RESOURCE_NAME_LIST";

/// An object replica that violates its resource's policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Logical path of the data object
    pub object_path: String,
    /// Leaf resource holding the violating replica
    pub resource: String,
    /// Last access time (epoch seconds), if the catalog returned one
    pub access_time: Option<i64>,
    /// Additional columns returned by a named query
    #[serde(default)]
    pub extra_fields: Vec<String>,
}

impl Violation {
    pub fn new(object_path: &str, resource: &str, access_time: Option<i64>) -> Self {
        Self {
            object_path: object_path.to_string(),
            resource: resource.to_string(),
            access_time,
            extra_fields: Vec::new(),
        }
    }

    /// Most overdue first; rows without an access time last; path breaks ties
    fn overdue_order(a: &Violation, b: &Violation) -> Ordering {
        match (a.access_time, b.access_time) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.object_path.cmp(&b.object_path))
    }
}

/// Time predicate query: replicas on `resource` last accessed before `older_than`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleReplicaQuery {
    pub resource: String,
    pub access_time_attribute: String,
    /// Cutoff, epoch seconds (exclusive)
    pub older_than: i64,
}

/// A named violating query with its tokens substituted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedQuery {
    /// Template as configured on the resource
    pub template: String,
    /// Template after substitution
    pub text: String,
    pub kind: QueryKind,
    /// Leaf resources the query is scoped to
    pub resources: Vec<String>,
    /// Bind arguments for specific queries: cutoff, then resource names
    pub args: Vec<String>,
}

/// Builds and runs violation queries against the catalog
pub struct ViolationQueryEngine<C: Catalog> {
    catalog: Arc<C>,
    access_time_attribute: String,
}

impl<C: Catalog> ViolationQueryEngine<C> {
    pub fn new(catalog: Arc<C>, access_time_attribute: &str) -> Self {
        Self {
            catalog,
            access_time_attribute: access_time_attribute.to_string(),
        }
    }

    /// Violations on `resource` as of now
    pub async fn find_violations(
        &self,
        resource: &str,
        policy: &TierPolicy,
    ) -> TieringResult<Vec<Violation>> {
        self.find_violations_at(resource, policy, Utc::now().timestamp())
            .await
    }

    /// Violations on `resource` as of `now` (epoch seconds)
    pub async fn find_violations_at(
        &self,
        resource: &str,
        policy: &TierPolicy,
        now: i64,
    ) -> TieringResult<Vec<Violation>> {
        let cutoff = policy.retention.cutoff(now);
        let mut rows = Vec::new();

        if let Some(older_than) = cutoff {
            let query = StaleReplicaQuery {
                resource: resource.to_string(),
                access_time_attribute: self.access_time_attribute.clone(),
                older_than,
            };
            rows.extend(self.catalog.stale_replicas(&query).await?);
        }

        for named in &policy.violating_queries {
            let rendered = render_query(named, &[resource.to_string()], cutoff.unwrap_or(0));
            debug!(resource, query = %rendered.text, "Running violating query");
            rows.extend(self.catalog.run_query(&rendered).await?);
        }

        let violations = merge_violations(rows, policy.object_limit.get() as usize);

        debug!(
            resource,
            retention = %policy.retention,
            count = violations.len(),
            "Violation query complete"
        );

        Ok(violations)
    }
}

/// Substitute the time and resource tokens of a named query
pub fn render_query(query: &ViolatingQuery, resources: &[String], cutoff: i64) -> RenderedQuery {
    let cutoff_str = cutoff.to_string();
    let quoted = resources
        .iter()
        .map(|r| format!("'{}'", r))
        .collect::<Vec<_>>()
        .join(", ");

    let text = query
        .template
        .replace(TIME_CHECK_TOKEN, &cutoff_str)
        .replace(RESOURCE_ID_LIST_TOKEN, &quoted)
        .replace(RESOURCE_NAME_LIST_TOKEN, &quoted);

    let args = match query.kind {
        QueryKind::Specific => std::iter::once(cutoff_str)
            .chain(resources.iter().cloned())
            .collect(),
        QueryKind::General => Vec::new(),
    };

    RenderedQuery {
        template: query.template.clone(),
        text,
        kind: query.kind,
        resources: resources.to_vec(),
        args,
    }
}

/// Union rows by object path (oldest access time wins), order, and cap
pub fn merge_violations(rows: Vec<Violation>, limit: usize) -> Vec<Violation> {
    let mut by_path: HashMap<String, Violation> = HashMap::new();

    for row in rows {
        match by_path.get_mut(&row.object_path) {
            Some(existing) => {
                let older = match (row.access_time, existing.access_time) {
                    (Some(new), Some(old)) => new < old,
                    (Some(_), None) => true,
                    _ => false,
                };
                if older {
                    *existing = row;
                }
            }
            None => {
                by_path.insert(row.object_path.clone(), row);
            }
        }
    }

    let mut merged: Vec<Violation> = by_path.into_values().collect();
    merged.sort_by(Violation::overdue_order);
    merged.truncate(limit);
    merged
}
