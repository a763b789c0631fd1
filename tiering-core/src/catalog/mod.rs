//! Metadata Catalog Module
//!
//! The catalog holds resource hierarchy, policy metadata, replica locations
//! and access times. The engine only talks to it through [`Catalog`].
//!
//! [`InMemoryCatalog`] is a reference implementation backed by a
//! serde-loadable [`CatalogFixture`], used by tests and the CLI.

pub mod memory;
pub mod traits;

pub use memory::{CatalogFixture, InMemoryCatalog, ObjectFixture, ResourceFixture};
pub use traits::{Catalog, MetadataEntry, ReplicaLocation, ResourceRecord};
