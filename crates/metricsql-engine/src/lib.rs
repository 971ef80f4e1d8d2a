//! metricsql engine - Core business logic
//!
//! This crate implements:
//! - Metrics view query expansion
//! - Migration inference between catalog states
//! - Dependency graph of catalog entities
//! - The semantic layer facade

pub mod dag;
pub mod expander;
pub mod migration;
pub mod layer;

pub use dag::DependencyGraph;
pub use expander::{ExpansionError, MetricsViewExpander};
pub use migration::{
    CatalogDocument, CatalogEntity, EntityKind, MigrationDiff, MigrationError, MigrationPlan,
    MigrationStep, StepKind,
};
pub use layer::{LayerError, Outcome, QueryValidationError, QueryValidator, SemanticLayer};
