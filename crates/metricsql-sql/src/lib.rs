//! SQL parsing and analysis
//!
//! This crate handles:
//! - Parsing SQL using datafusion-sqlparser-rs, plus the metrics view and
//!   source statements
//! - Canonical rendering of statements
//! - Interpreting metrics view definitions
//! - Extracting direct dependencies of views and tables

pub mod ast;
pub mod parser;
pub mod metrics_view;
pub mod dependencies;

pub use ast::{plain_name, simple_name, CreateMetricsView, CreateSource, DropMetricsView, Statement};
pub use parser::{SqlParser, ParseError};
pub use metrics_view::{MetricsViewDefinition, ViewColumn, DefinitionError};
pub use dependencies::DependencyExtractor;
