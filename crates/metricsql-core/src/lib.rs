//! metricsql core
//!
//! Shared, stable types for the metrics semantic layer.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod config;
pub mod ordered_map;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use config::{Config, ConfigError, DialectConfig, SeverityThreshold};
pub use ordered_map::OrderedMap;
