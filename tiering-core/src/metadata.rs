//! Metadata Accessor
//!
//! Reads policy attributes attached to resources and data objects.
//! An absent attribute is `Ok(None)`; only catalog failures are errors, so
//! callers can tell "no policy configured" apart from "catalog is down".

use std::sync::Arc;

use crate::catalog::{Catalog, MetadataEntry};
use crate::error::TieringResult;

/// Attribute reader over a [`Catalog`]
pub struct MetadataAccessor<C: Catalog> {
    catalog: Arc<C>,
}

impl<C: Catalog> Clone for MetadataAccessor<C> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
        }
    }
}

impl<C: Catalog> MetadataAccessor<C> {
    pub fn new(catalog: Arc<C>) -> Self {
        Self { catalog }
    }

    /// Most recent entry of `attribute` on a resource
    pub async fn get(&self, attribute: &str, resource: &str) -> TieringResult<Option<MetadataEntry>> {
        Ok(self.get_all(attribute, resource).await?.pop())
    }

    /// Most recent value of `attribute` on a resource
    pub async fn get_value(&self, attribute: &str, resource: &str) -> TieringResult<Option<String>> {
        Ok(self.get(attribute, resource).await?.map(|e| e.value))
    }

    /// Every entry of `attribute` on a resource, in catalog order
    pub async fn get_all(&self, attribute: &str, resource: &str) -> TieringResult<Vec<MetadataEntry>> {
        self.catalog.resource_metadata(resource, attribute).await
    }

    /// Most recent entry of `attribute` on a data object
    pub async fn get_for_object(
        &self,
        attribute: &str,
        object_path: &str,
    ) -> TieringResult<Option<MetadataEntry>> {
        Ok(self
            .catalog
            .object_metadata(object_path, attribute)
            .await?
            .pop())
    }

    /// Resources carrying `attribute = value`
    pub async fn members_of(
        &self,
        attribute: &str,
        value: &str,
    ) -> TieringResult<Vec<(String, MetadataEntry)>> {
        self.catalog.resources_with_metadata(attribute, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogFixture, InMemoryCatalog};
    use crate::error::TieringError;

    fn accessor() -> (Arc<InMemoryCatalog>, MetadataAccessor<InMemoryCatalog>) {
        let fixture = CatalogFixture::new()
            .with_resource_metadata("fast", "tier::time", "30", "")
            .with_resource_metadata("fast", "tier::time", "60", "")
            .with_resource_metadata("fast", "tier::query", "q1", "")
            .with_resource_metadata("fast", "tier::query", "q2", "specific")
            .with_resource("bare");
        let catalog = Arc::new(InMemoryCatalog::from_fixture(fixture));
        (catalog.clone(), MetadataAccessor::new(catalog))
    }

    #[tokio::test]
    async fn test_get_returns_most_recent() {
        let (_, metadata) = accessor();
        let value = metadata.get_value("tier::time", "fast").await.unwrap();
        assert_eq!(value.as_deref(), Some("60"));
    }

    #[tokio::test]
    async fn test_absent_is_not_an_error() {
        let (_, metadata) = accessor();
        assert_eq!(metadata.get("tier::time", "bare").await.unwrap(), None);
        assert_eq!(metadata.get("tier::time", "nowhere").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_all_keeps_catalog_order() {
        let (_, metadata) = accessor();
        let queries = metadata.get_all("tier::query", "fast").await.unwrap();
        let values: Vec<_> = queries.iter().map(|e| e.value.as_str()).collect();
        assert_eq!(values, vec!["q1", "q2"]);
        assert_eq!(queries[1].unit, "specific");
    }

    #[tokio::test]
    async fn test_catalog_failure_is_distinct_from_absence() {
        let (catalog, metadata) = accessor();
        catalog.set_unavailable(true);
        let result = metadata.get("tier::time", "bare").await;
        assert!(matches!(result, Err(TieringError::Catalog(_))));
    }
}
