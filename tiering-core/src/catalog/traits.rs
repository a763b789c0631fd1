//! Metadata Catalog Traits
//!
//! Defines the interface the engine uses to read and write catalog state.
//! The catalog itself (storage engine, query language) is external; an
//! implementation adapts a real catalog client to this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TieringResult;
use crate::violation::{RenderedQuery, StaleReplicaQuery, Violation};

/// Metadata Catalog Trait
///
/// Every method maps to one catalog round trip. Failures (catalog unreachable,
/// malformed query) come back as [`crate::TieringError::Catalog`]; absence of
/// data is an empty result, never an error, except when writing to an object
/// that does not exist.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up a resource and its position in the resource hierarchy
    async fn resource(&self, name: &str) -> TieringResult<Option<ResourceRecord>>;

    /// All metadata entries with `attribute` on a resource, in catalog order
    async fn resource_metadata(
        &self,
        resource: &str,
        attribute: &str,
    ) -> TieringResult<Vec<MetadataEntry>>;

    /// Resources carrying `attribute = value`, with the matching entry
    async fn resources_with_metadata(
        &self,
        attribute: &str,
        value: &str,
    ) -> TieringResult<Vec<(String, MetadataEntry)>>;

    /// Replicas on a resource whose access time is older than the cutoff
    async fn stale_replicas(&self, query: &StaleReplicaQuery) -> TieringResult<Vec<Violation>>;

    /// Execute a named violating query after template substitution
    async fn run_query(&self, query: &RenderedQuery) -> TieringResult<Vec<Violation>>;

    /// Where the replicas of a data object live
    async fn object_replicas(&self, object_path: &str) -> TieringResult<Vec<ReplicaLocation>>;

    /// All metadata entries with `attribute` on a data object, in catalog order
    async fn object_metadata(
        &self,
        object_path: &str,
        attribute: &str,
    ) -> TieringResult<Vec<MetadataEntry>>;

    /// Replace every value of `entry.attribute` on a data object with `entry`.
    ///
    /// An unknown object is [`crate::TieringError::ObjectNotFound`].
    async fn set_object_metadata(&self, object_path: &str, entry: MetadataEntry)
        -> TieringResult<()>;
}

/// Attribute/value/unit triple attached to a resource or data object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub attribute: String,
    pub value: String,
    #[serde(default)]
    pub unit: String,
}

impl MetadataEntry {
    pub fn new(attribute: &str, value: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            value: value.to_string(),
            unit: String::new(),
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }
}

/// A resource and its links in the resource hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub name: String,
    /// Coordinating resource this one belongs to
    pub parent: Option<String>,
    /// Child resources; empty for a leaf
    pub children: Vec<String>,
}

impl ResourceRecord {
    /// A resource with no children stores data itself
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Location of one replica of a data object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaLocation {
    pub object_path: String,
    /// Leaf resource holding the replica
    pub resource: String,
}
