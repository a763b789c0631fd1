//! In-Memory Catalog
//!
//! Reference [`Catalog`] backed by a [`CatalogFixture`]. The fixture is plain
//! serde data so a catalog snapshot can be loaded from or written to JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::traits::{Catalog, MetadataEntry, ReplicaLocation, ResourceRecord};
use crate::config::AttributeNames;
use crate::error::{TieringError, TieringResult};
use crate::violation::{RenderedQuery, StaleReplicaQuery, Violation};

/// A resource in a fixture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFixture {
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
}

/// A data object in a fixture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectFixture {
    /// Leaf resources holding a replica
    #[serde(default)]
    pub replicas: Vec<String>,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
}

/// Serializable catalog contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFixture {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceFixture>,
    #[serde(default)]
    pub objects: BTreeMap<String, ObjectFixture>,
    /// Named query template -> object paths it selects
    #[serde(default)]
    pub queries: BTreeMap<String, Vec<String>>,
}

impl CatalogFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a fixture from JSON
    pub fn from_json(json: &str) -> TieringResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| TieringError::Configuration(format!("invalid catalog fixture: {}", e)))
    }

    /// Render the fixture as pretty JSON
    pub fn to_json(&self) -> TieringResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TieringError::Configuration(format!("cannot encode catalog fixture: {}", e)))
    }

    /// Add a resource (no-op if present)
    pub fn with_resource(mut self, name: &str) -> Self {
        self.resources.entry(name.to_string()).or_default();
        self
    }

    /// Add `child` under coordinating resource `parent`, creating both
    pub fn with_child(mut self, parent: &str, child: &str) -> Self {
        self.resources.entry(child.to_string()).or_default();
        let entry = self.resources.entry(parent.to_string()).or_default();
        if !entry.children.iter().any(|c| c == child) {
            entry.children.push(child.to_string());
        }
        self
    }

    /// Attach a metadata entry to a resource, creating it if needed
    pub fn with_resource_metadata(mut self, resource: &str, attribute: &str, value: &str, unit: &str) -> Self {
        self.resources
            .entry(resource.to_string())
            .or_default()
            .metadata
            .push(MetadataEntry::new(attribute, value).with_unit(unit));
        self
    }

    /// Place a resource in a tier group, using the default attribute name
    pub fn with_tier(self, resource: &str, group: &str, index: u32) -> Self {
        let attribute = AttributeNames::default().group;
        self.with_resource_metadata(resource, &attribute, group, &index.to_string())
    }

    /// Add a replica of `object_path` on `resource`
    pub fn with_replica(mut self, object_path: &str, resource: &str) -> Self {
        let object = self.objects.entry(object_path.to_string()).or_default();
        if !object.replicas.iter().any(|r| r == resource) {
            object.replicas.push(resource.to_string());
        }
        self
    }

    /// Attach a metadata entry to a data object, creating it if needed
    pub fn with_object_metadata(mut self, object_path: &str, attribute: &str, value: &str) -> Self {
        self.objects
            .entry(object_path.to_string())
            .or_default()
            .metadata
            .push(MetadataEntry::new(attribute, value));
        self
    }

    /// Set the access time of a data object, using the default attribute name
    pub fn with_access_time(self, object_path: &str, epoch_secs: i64) -> Self {
        let attribute = AttributeNames::default().access_time;
        self.with_object_metadata(object_path, &attribute, &epoch_secs.to_string())
    }

    /// Register the object paths a named query selects
    pub fn with_query_result(mut self, template: &str, object_paths: &[&str]) -> Self {
        self.queries.insert(
            template.to_string(),
            object_paths.iter().map(|p| p.to_string()).collect(),
        );
        self
    }
}

/// In-memory catalog for tests and offline runs
pub struct InMemoryCatalog {
    state: RwLock<CatalogFixture>,
    access_time_attribute: String,
    unavailable: AtomicBool,
    failing_resources: RwLock<HashSet<String>>,
    executed_queries: RwLock<Vec<RenderedQuery>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::from_fixture(CatalogFixture::default())
    }

    pub fn from_fixture(fixture: CatalogFixture) -> Self {
        Self {
            state: RwLock::new(fixture),
            access_time_attribute: AttributeNames::default().access_time,
            unavailable: AtomicBool::new(false),
            failing_resources: RwLock::new(HashSet::new()),
            executed_queries: RwLock::new(Vec::new()),
        }
    }

    /// Read access times from a non-default attribute when running named queries
    pub fn with_access_time_attribute(mut self, attribute: &str) -> Self {
        self.access_time_attribute = attribute.to_string();
        self
    }

    /// Make every call fail as if the catalog were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make violation queries on `resource` fail
    pub async fn fail_queries_for(&self, resource: &str) {
        self.failing_resources.write().await.insert(resource.to_string());
    }

    /// Named queries executed so far
    pub async fn executed_queries(&self) -> Vec<RenderedQuery> {
        self.executed_queries.read().await.clone()
    }

    /// Copy of the current catalog contents
    pub async fn snapshot(&self) -> CatalogFixture {
        self.state.read().await.clone()
    }

    fn check_available(&self) -> TieringResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TieringError::Catalog("catalog unavailable".to_string()));
        }
        Ok(())
    }

    async fn check_resource_queryable(&self, resource: &str) -> TieringResult<()> {
        self.check_available()?;
        if self.failing_resources.read().await.contains(resource) {
            return Err(TieringError::Catalog(format!(
                "query on resource '{}' failed",
                resource
            )));
        }
        Ok(())
    }

    fn access_time_of(object: &ObjectFixture, attribute: &str) -> Option<i64> {
        object
            .metadata
            .iter()
            .rev()
            .find(|m| m.attribute == attribute)
            .and_then(|m| m.value.trim().parse().ok())
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn resource(&self, name: &str) -> TieringResult<Option<ResourceRecord>> {
        self.check_available()?;
        let state = self.state.read().await;

        let Some(fixture) = state.resources.get(name) else {
            return Ok(None);
        };

        let parent = state
            .resources
            .iter()
            .find(|(_, r)| r.children.iter().any(|c| c == name))
            .map(|(n, _)| n.clone());

        Ok(Some(ResourceRecord {
            name: name.to_string(),
            parent,
            children: fixture.children.clone(),
        }))
    }

    async fn resource_metadata(
        &self,
        resource: &str,
        attribute: &str,
    ) -> TieringResult<Vec<MetadataEntry>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .resources
            .get(resource)
            .map(|r| {
                r.metadata
                    .iter()
                    .filter(|m| m.attribute == attribute)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn resources_with_metadata(
        &self,
        attribute: &str,
        value: &str,
    ) -> TieringResult<Vec<(String, MetadataEntry)>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut matches = Vec::new();
        for (name, resource) in &state.resources {
            for entry in &resource.metadata {
                if entry.attribute == attribute && entry.value == value {
                    matches.push((name.clone(), entry.clone()));
                }
            }
        }
        Ok(matches)
    }

    async fn stale_replicas(&self, query: &StaleReplicaQuery) -> TieringResult<Vec<Violation>> {
        self.check_resource_queryable(&query.resource).await?;
        let state = self.state.read().await;

        Ok(state
            .objects
            .iter()
            .filter(|(_, object)| object.replicas.iter().any(|r| *r == query.resource))
            .filter_map(|(path, object)| {
                let access_time = Self::access_time_of(object, &query.access_time_attribute)?;
                (access_time < query.older_than)
                    .then(|| Violation::new(path, &query.resource, Some(access_time)))
            })
            .collect())
    }

    async fn run_query(&self, query: &RenderedQuery) -> TieringResult<Vec<Violation>> {
        for resource in &query.resources {
            self.check_resource_queryable(resource).await?;
        }
        self.executed_queries.write().await.push(query.clone());

        let state = self.state.read().await;
        let paths = state.queries.get(&query.template).ok_or_else(|| {
            TieringError::Catalog(format!("unknown query '{}'", query.template))
        })?;

        let mut rows = Vec::new();
        for path in paths {
            let Some(object) = state.objects.get(path) else {
                continue;
            };
            let Some(resource) = object
                .replicas
                .iter()
                .find(|r| query.resources.contains(r))
            else {
                continue;
            };
            rows.push(Violation::new(
                path,
                resource,
                Self::access_time_of(object, &self.access_time_attribute),
            ));
        }
        Ok(rows)
    }

    async fn object_replicas(&self, object_path: &str) -> TieringResult<Vec<ReplicaLocation>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .objects
            .get(object_path)
            .map(|o| {
                o.replicas
                    .iter()
                    .map(|r| ReplicaLocation {
                        object_path: object_path.to_string(),
                        resource: r.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn object_metadata(
        &self,
        object_path: &str,
        attribute: &str,
    ) -> TieringResult<Vec<MetadataEntry>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .objects
            .get(object_path)
            .map(|o| {
                o.metadata
                    .iter()
                    .filter(|m| m.attribute == attribute)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_object_metadata(
        &self,
        object_path: &str,
        entry: MetadataEntry,
    ) -> TieringResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let object = state
            .objects
            .get_mut(object_path)
            .ok_or_else(|| TieringError::ObjectNotFound(object_path.to_string()))?;

        object.metadata.retain(|m| m.attribute != entry.attribute);
        object.metadata.push(entry);
        Ok(())
    }
}
