//! Semantic layer facade
//!
//! Composes the parser, artifact store, connector registry and an optional
//! query validator into the operations a host calls:
//! - `expand` / `runnable_query` for queries over metrics views
//! - `save_metrics_view` / `save_source` for declarations
//! - `infer_migrations` for catalog diffs
//! - `execute` to dispatch on whatever statement was submitted

use crate::expander::{ExpansionError, MetricsViewExpander};
use crate::migration::{MigrationDiff, MigrationError, MigrationPlan, MigrationStep};
use metricsql_catalog::{
    Artifact, ArtifactKind, ArtifactStore, ConnectorRegistry, StoreError, ValidationError,
};
use metricsql_core::{Config, Diagnostic, DiagnosticCode};
use metricsql_sql::{
    plain_name, simple_name, DefinitionError, MetricsViewDefinition, ParseError, SqlParser,
    Statement,
};
use std::sync::Arc;

/// Semantic validation of a statement against the host's schema
pub trait QueryValidator: Send + Sync {
    fn validate(&self, statement: &Statement) -> Result<(), QueryValidationError>;
}

/// Rejection from a `QueryValidator`
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct QueryValidationError {
    pub message: String,

    /// Validator-specific error code
    pub code: Option<String>,
}

impl QueryValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Result of `SemanticLayer::execute`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Canonical DDL of the saved metrics view
    MetricsViewSaved(String),

    /// Canonical DDL of the saved source
    SourceSaved(String),

    /// Expanded, rendered statement
    Query(String),
}

pub struct SemanticLayer {
    config: Config,
    parser: SqlParser,
    store: Arc<dyn ArtifactStore>,
    connectors: ConnectorRegistry,
    validator: Option<Box<dyn QueryValidator>>,
}

impl SemanticLayer {
    /// Layer with default config and the built-in connectors
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self::from_config(Config::default(), store)
    }

    pub fn from_config(config: Config, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            parser: SqlParser::from_dialect(&config.dialect),
            config,
            store,
            connectors: ConnectorRegistry::default(),
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Box<dyn QueryValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_connectors(mut self, connectors: ConnectorRegistry) -> Self {
        self.connectors = connectors;
        self
    }

    pub fn parser(&self) -> &SqlParser {
        &self.parser
    }

    pub fn store(&self) -> &dyn ArtifactStore {
        self.store.as_ref()
    }

    /// Parse one statement and expand metrics view references in it
    pub fn expand(&self, sql: &str) -> Result<Statement, LayerError> {
        let statement = self.parser.parse_statement(sql)?;
        Ok(self.expander().expand(statement)?)
    }

    /// Expand, validate and render a query
    pub fn runnable_query(&self, sql: &str) -> Result<String, LayerError> {
        let statement = self.parser.parse_statement(sql)?;
        self.run_statement(statement)
    }

    /// Declare a metrics view, returning its canonical DDL
    pub fn save_metrics_view(&self, sql: &str) -> Result<String, LayerError> {
        let statement = self.parser.parse_statement(sql)?;
        self.save_metrics_view_statement(statement)
    }

    /// Declare a source, returning its canonical DDL
    pub fn save_source(&self, sql: &str) -> Result<String, LayerError> {
        let statement = self.parser.parse_statement(sql)?;
        self.save_source_statement(statement)
    }

    /// Migration steps from the catalog document to the declared batch
    pub fn infer_migrations(&self, new_sql: &str, catalog_json: &str) -> Result<Vec<MigrationStep>, LayerError> {
        Ok(MigrationDiff::new(&self.parser).infer(new_sql, catalog_json)?)
    }

    /// Migration steps with the dependency graph of the existing state
    pub fn plan_migrations(&self, new_sql: &str, catalog_json: &str) -> Result<MigrationPlan, LayerError> {
        Ok(MigrationDiff::new(&self.parser).plan(new_sql, catalog_json)?)
    }

    /// Dispatch on the kind of the submitted statement
    pub fn execute(&self, sql: &str) -> Result<Outcome, LayerError> {
        let statement = self.parser.parse_statement(sql)?;

        match statement {
            Statement::CreateMetricsView(_) => self
                .save_metrics_view_statement(statement)
                .map(Outcome::MetricsViewSaved),
            Statement::CreateSource(_) => self
                .save_source_statement(statement)
                .map(Outcome::SourceSaved),
            other => self.run_statement(other).map(Outcome::Query),
        }
    }

    /// Convert an error to a diagnostic, applying configured severity overrides
    pub fn diagnostic(&self, error: &LayerError) -> Diagnostic {
        let mut diagnostic = error.to_diagnostic();
        diagnostic.severity = self
            .config
            .severity
            .get_severity(diagnostic.code, diagnostic.severity);
        diagnostic
    }

    fn expander(&self) -> MetricsViewExpander<'_> {
        MetricsViewExpander::new(self.store.as_ref(), &self.parser)
    }

    fn run_statement(&self, statement: Statement) -> Result<String, LayerError> {
        let expanded = self.expander().expand(statement)?;
        if let Some(validator) = &self.validator {
            validator.validate(&expanded)?;
        }
        Ok(expanded.canonical())
    }

    fn save_metrics_view_statement(&self, statement: Statement) -> Result<String, LayerError> {
        let Statement::CreateMetricsView(view) = &statement else {
            return Err(LayerError::unsupported("CREATE METRICS VIEW", &statement));
        };
        let definition = MetricsViewDefinition::from_statement(view)?;

        if let Some(validator) = &self.validator {
            for query in definition.validation_queries() {
                tracing::debug!(view = %view.name, %query, "validating measure");
                validator.validate(&self.parser.parse_statement(&query)?)?;
            }
        }

        let ddl = statement.canonical();
        self.store
            .save(Artifact::new(ArtifactKind::MetricsView, plain_name(&view.name), ddl.clone()))?;
        Ok(ddl)
    }

    fn save_source_statement(&self, statement: Statement) -> Result<String, LayerError> {
        let Statement::CreateSource(source) = &statement else {
            return Err(LayerError::unsupported("CREATE SOURCE", &statement));
        };

        self.connectors
            .validate(&simple_name(&source.name), &source.properties)?;

        let ddl = statement.canonical();
        self.store
            .save(Artifact::new(ArtifactKind::Source, plain_name(&source.name), ddl.clone()))?;
        Ok(ddl)
    }
}

/// Errors surfaced by the semantic layer
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Expansion(#[from] ExpansionError),

    #[error(transparent)]
    Source(#[from] ValidationError),

    #[error(transparent)]
    Query(#[from] QueryValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("Expected {expected}, found {found}")]
    UnsupportedStatement { expected: &'static str, found: String },
}

impl LayerError {
    fn unsupported(expected: &'static str, statement: &Statement) -> Self {
        Self::UnsupportedStatement {
            expected,
            found: statement.kind_name().to_string(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Parse(error) => error.to_diagnostic(),
            Self::Definition(error) => error.to_diagnostic(),
            Self::Expansion(error) => error.to_diagnostic(),
            Self::Source(error) => error.to_diagnostic(),
            Self::Query(error) => Diagnostic::error(DiagnosticCode::QueryValidation, error.to_string()),
            Self::Store(error) => error.to_diagnostic(),
            Self::Migration(error) => error.to_diagnostic(),
            Self::UnsupportedStatement { .. } => {
                Diagnostic::error(DiagnosticCode::SqlUnsupportedStatement, self.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricsql_catalog::InMemoryArtifactStore;
    use metricsql_core::Severity;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Records every statement it sees and rejects those mentioning `forbidden`
    #[derive(Default)]
    struct RecordingValidator {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl QueryValidator for RecordingValidator {
        fn validate(&self, statement: &Statement) -> Result<(), QueryValidationError> {
            let sql = statement.to_string();
            self.seen.lock().unwrap().push(sql.clone());
            if sql.contains("forbidden") {
                return Err(QueryValidationError::new("Column 'forbidden' not found").with_code("E1"));
            }
            Ok(())
        }
    }

    fn layer() -> SemanticLayer {
        SemanticLayer::new(Arc::new(InMemoryArtifactStore::new()))
    }

    #[test]
    fn save_metrics_view_validates_each_measure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let layer = layer().with_validator(Box::new(RecordingValidator { seen: seen.clone() }));

        layer
            .save_metrics_view("CREATE METRICS VIEW mv DIMENSIONS a MEASURES SUM(x) AS s, MAX(y) AS m FROM t")
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "SELECT a, SUM(x) AS s FROM t GROUP BY 1".to_string(),
                "SELECT a, MAX(y) AS m FROM t GROUP BY 1".to_string(),
            ]
        );
    }

    #[test]
    fn rejected_measure_is_not_saved() {
        let layer = layer().with_validator(Box::new(RecordingValidator::default()));

        let error = layer
            .save_metrics_view("CREATE METRICS VIEW mv DIMENSIONS a MEASURES SUM(forbidden) AS s FROM t")
            .unwrap_err();

        assert!(matches!(error, LayerError::Query(_)));
        assert!(layer.store().get(ArtifactKind::MetricsView, "mv").is_none());
    }

    #[test]
    fn runnable_query_is_validated_after_expansion() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let layer = layer().with_validator(Box::new(RecordingValidator { seen: seen.clone() }));
        layer
            .save_metrics_view("CREATE METRICS VIEW mv DIMENSIONS a MEASURES COUNT(*) AS n FROM t")
            .unwrap();

        let sql = layer.runnable_query("SELECT a, n FROM mv").unwrap();
        assert_eq!(sql, "SELECT a, COUNT(*) AS n FROM t GROUP BY 1");
        assert_eq!(seen.lock().unwrap().last(), Some(&sql));

        let error = layer.runnable_query("SELECT forbidden FROM t").unwrap_err();
        assert_eq!(error.to_diagnostic().code, DiagnosticCode::QueryValidation);
    }

    #[test]
    fn save_metrics_view_rejects_other_statements() {
        let error = layer().save_metrics_view("SELECT 1").unwrap_err();
        assert_eq!(error.to_string(), "Expected CREATE METRICS VIEW, found QUERY");
    }

    #[test]
    fn save_source_rejects_invalid_connector() {
        let error = layer()
            .save_source("CREATE SOURCE clicks WITH (connector = 's4')")
            .unwrap_err();

        assert_eq!(error.to_string(), "No connector of type [s4] found for source [clicks]");
        assert_eq!(error.to_diagnostic().code, DiagnosticCode::SourceValidation);
    }

    #[test]
    fn severity_overrides_apply() {
        let mut config = Config::default();
        config
            .severity
            .set_override(DiagnosticCode::SourceValidation, Severity::Warn);
        let layer = SemanticLayer::from_config(config, Arc::new(InMemoryArtifactStore::new()));

        let error = layer
            .save_source("CREATE SOURCE clicks WITH (connector = 's3')")
            .unwrap_err();

        assert_eq!(layer.diagnostic(&error).severity, Severity::Warn);
        assert_eq!(error.to_diagnostic().severity, Severity::Error);
    }
}
