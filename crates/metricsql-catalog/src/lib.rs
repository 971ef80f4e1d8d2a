//! Catalog of declared artifacts
//!
//! This crate provides:
//! - The artifact store holding metrics view and source definitions
//! - Connector validation for source declarations
//!
//! ## Example
//!
//! ```rust,ignore
//! use metricsql_catalog::{ConnectorRegistry, InMemoryArtifactStore};
//!
//! let store = InMemoryArtifactStore::from_snapshot_json(&json)?;
//! ConnectorRegistry::default().validate("clicks", &properties)?;
//! ```

pub mod store;
pub mod connector;

pub use store::{Artifact, ArtifactKind, ArtifactStore, InMemoryArtifactStore, StoreError, StoreSnapshot};
pub use connector::{ConnectorRegistry, ConnectorValidator, S3Connector, ValidationError, CONNECTOR_PROPERTY};
