//! Migration inference between a persisted catalog and a declared one
//!
//! Compares entities by name and canonical DDL and produces DROP and CREATE
//! steps. All drops come first (batched and re-rendered together), followed
//! by creates in declaration order. Metrics views are catalog-only objects,
//! so creating one is an `InsertCatalog` step rather than infrastructure DDL.
//!
//! Renames are not detected: a renamed entity is a drop plus a create.
//! A dependency graph of the existing entities is built and reported, but
//! it does not influence ordering or force dependants to be recreated.

use crate::dag::DependencyGraph;
use metricsql_core::{Diagnostic, DiagnosticCode, OrderedMap};
use metricsql_sql::{plain_name, DependencyExtractor, ParseError, SqlParser, Statement};
use serde::{Deserialize, Serialize};

/// Existing-state document: `{ "entities": [ { "name", "ddl", "columns" } ] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub entities: Vec<CatalogEntity>,
}

impl CatalogDocument {
    pub fn from_json(json: &str) -> Result<Self, MigrationError> {
        serde_json::from_str(json).map_err(|e| MigrationError::InvalidDocument(e.to_string()))
    }
}

/// One entity of the existing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntity {
    pub name: String,

    /// DDL that created the entity; absent for entities this system did not create
    #[serde(default)]
    pub ddl: Option<String>,

    /// Column metadata, carried but not compared
    #[serde(default)]
    pub columns: Vec<serde_json::Value>,
}

/// Kind of a diffed entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Table,
    View,
    MetricsView,
}

impl EntityKind {
    fn of(statement: &Statement) -> Option<(Self, String, String)> {
        match statement {
            Statement::Sql(sqlparser::ast::Statement::CreateTable(create)) => {
                Some((Self::Table, create.name.to_string(), plain_name(&create.name)))
            }
            Statement::Sql(sqlparser::ast::Statement::CreateView { name, .. }) => {
                Some((Self::View, name.to_string(), plain_name(name)))
            }
            Statement::CreateMetricsView(view) => {
                Some((Self::MetricsView, view.name.to_string(), plain_name(&view.name)))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "TABLE"),
            Self::View => write!(f, "VIEW"),
            Self::MetricsView => write!(f, "METRICS VIEW"),
        }
    }
}

/// How a step is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    /// Run the DDL against the backing engine
    ExecuteInfra,

    /// Record the DDL in the catalog only
    InsertCatalog,
}

/// One unit of catalog change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub kind: StepKind,
    pub ddl: String,
}

impl MigrationStep {
    pub fn execute_infra(ddl: impl Into<String>) -> Self {
        Self {
            kind: StepKind::ExecuteInfra,
            ddl: ddl.into(),
        }
    }

    pub fn insert_catalog(ddl: impl Into<String>) -> Self {
        Self {
            kind: StepKind::InsertCatalog,
            ddl: ddl.into(),
        }
    }

    fn create(kind: EntityKind, ddl: String) -> Self {
        match kind {
            EntityKind::MetricsView => Self::insert_catalog(ddl),
            _ => Self::execute_infra(ddl),
        }
    }
}

/// Steps plus the informational dependency graph of the existing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub steps: Vec<MigrationStep>,
    pub dependencies: DependencyGraph,
}

/// Entity as seen by one diff computation
#[derive(Debug, Clone)]
struct Entity {
    /// Name used in generated DROP statements
    name: String,
    /// Absent only for existing entities without DDL
    kind: Option<EntityKind>,
    /// Canonical DDL
    ddl: Option<String>,
    /// Quote and case insensitive form of `ddl`, used for comparison
    form: Option<String>,
    dependencies: Vec<String>,
}

/// Migration inference
pub struct MigrationDiff<'a> {
    parser: &'a SqlParser,
}

impl<'a> MigrationDiff<'a> {
    pub fn new(parser: &'a SqlParser) -> Self {
        Self { parser }
    }

    /// Steps that turn the catalog document into the declared batch
    pub fn infer(&self, desired_sql: &str, catalog_json: &str) -> Result<Vec<MigrationStep>, MigrationError> {
        Ok(self.plan(desired_sql, catalog_json)?.steps)
    }

    /// Steps and dependency graph for the declared batch against the catalog document
    pub fn plan(&self, desired_sql: &str, catalog_json: &str) -> Result<MigrationPlan, MigrationError> {
        let desired = self.parser.parse_statements(desired_sql)?;
        let document = CatalogDocument::from_json(catalog_json)?;
        self.plan_statements(&desired, &document)
    }

    /// Diff already parsed statements against a catalog document
    pub fn plan_statements(
        &self,
        desired: &[Statement],
        document: &CatalogDocument,
    ) -> Result<MigrationPlan, MigrationError> {
        let mut existing = self.existing_entities(document)?;
        let dependencies = DependencyGraph::from_edges(
            existing
                .iter()
                .map(|(key, entity)| (key.to_string(), entity.dependencies.clone())),
        );
        let desired = self.desired_entities(desired)?;

        let mut drops = Vec::new();
        let mut creates = Vec::new();

        for (key, create) in desired.iter() {
            let Some(kind) = create.kind else { continue };
            let ddl = create.ddl.clone().unwrap_or_default();

            match existing.remove(key) {
                Some(previous) if previous.form.is_some() && previous.form == create.form => {
                    tracing::debug!(entity = %create.name, "unchanged");
                }
                Some(previous) => {
                    if let Some(previous_kind) = previous.kind {
                        tracing::debug!(
                            entity = %create.name,
                            downstream = ?dependencies.downstream(key),
                            "definition changed, recreating"
                        );
                        drops.push(drop_ddl(previous_kind, &previous.name));
                    } else {
                        tracing::debug!(entity = %create.name, "replacing entity not created by this system");
                    }
                    creates.push(MigrationStep::create(kind, ddl));
                }
                None => {
                    tracing::debug!(entity = %create.name, kind = %kind, "new entity");
                    creates.push(MigrationStep::create(kind, ddl));
                }
            }
        }

        for orphan in existing.values() {
            match orphan.kind {
                Some(kind) => {
                    tracing::debug!(entity = %orphan.name, "no longer declared, dropping");
                    drops.push(drop_ddl(kind, &orphan.name));
                }
                None => tracing::debug!(entity = %orphan.name, "skipping entity without DDL"),
            }
        }

        let mut steps = Vec::with_capacity(drops.len() + creates.len());
        if !drops.is_empty() {
            for drop in self.parser.parse_statements(&drops.join(";"))? {
                steps.push(MigrationStep::execute_infra(drop.canonical()));
            }
        }
        steps.extend(creates);

        Ok(MigrationPlan {
            steps,
            dependencies,
        })
    }

    /// Parse and canonicalize the existing state. Tables and views are named
    /// by their DDL, metrics views and DDL-less entities by the document.
    fn existing_entities(&self, document: &CatalogDocument) -> Result<OrderedMap<Entity>, MigrationError> {
        let mut entities = OrderedMap::new();

        for entry in &document.entities {
            let Some(ddl) = &entry.ddl else {
                entities.insert(
                    &entry.name,
                    Entity {
                        name: entry.name.clone(),
                        kind: None,
                        ddl: None,
                        form: None,
                        dependencies: Vec::new(),
                    },
                );
                continue;
            };

            let statement = self.parser.parse_statement(ddl).map_err(|error| {
                MigrationError::InvalidEntity {
                    name: entry.name.clone(),
                    error,
                }
            })?;
            let Some((kind, rendered_name, key)) = EntityKind::of(&statement) else {
                return Err(MigrationError::UnsupportedEntity {
                    name: entry.name.clone(),
                    statement: statement.kind_name().to_string(),
                });
            };

            let form = self.parser.comparison_form(&statement).map_err(|error| {
                MigrationError::InvalidEntity {
                    name: entry.name.clone(),
                    error,
                }
            })?;

            let (name, key) = match kind {
                EntityKind::MetricsView => (
                    self.parser.quote_ident(&entry.name).to_string(),
                    entry.name.clone(),
                ),
                _ => (rendered_name, key),
            };

            entities.insert(
                &key,
                Entity {
                    name,
                    kind: Some(kind),
                    ddl: Some(statement.canonical()),
                    form: Some(form),
                    dependencies: DependencyExtractor::extract(&statement),
                },
            );
        }

        Ok(entities)
    }

    fn desired_entities(&self, statements: &[Statement]) -> Result<OrderedMap<Entity>, MigrationError> {
        let mut entities = OrderedMap::new();

        for statement in statements {
            let Some((kind, name, key)) = EntityKind::of(statement) else {
                return Err(MigrationError::UnsupportedStatement {
                    statement: statement.kind_name().to_string(),
                });
            };

            entities.insert(
                &key,
                Entity {
                    name,
                    kind: Some(kind),
                    ddl: Some(statement.canonical()),
                    form: Some(self.parser.comparison_form(statement)?),
                    dependencies: Vec::new(),
                },
            );
        }

        Ok(entities)
    }
}

fn drop_ddl(kind: EntityKind, name: &str) -> String {
    format!("DROP {kind} {name}")
}

/// Migration inference errors
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Invalid catalog document: {0}")]
    InvalidDocument(String),

    #[error("Invalid DDL for entity [{name}]: {error}")]
    InvalidEntity { name: String, error: ParseError },

    #[error("Unsupported statement {statement} in migration, expected CREATE TABLE, VIEW or METRICS VIEW")]
    UnsupportedStatement { statement: String },

    #[error("Unsupported statement {statement} for entity [{name}]")]
    UnsupportedEntity { name: String, statement: String },
}

impl MigrationError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Parse(error) => error.to_diagnostic(),
            Self::InvalidDocument(_) => {
                Diagnostic::error(DiagnosticCode::CatalogDocumentInvalid, self.to_string())
            }
            Self::InvalidEntity { name, error } => {
                Diagnostic::error(DiagnosticCode::CatalogDocumentInvalid, self.to_string())
                    .with_optional_location(error.location())
                    .with_subject(name.clone())
            }
            Self::UnsupportedStatement { .. } => {
                Diagnostic::error(DiagnosticCode::SqlUnsupportedStatement, self.to_string())
            }
            Self::UnsupportedEntity { name, .. } => {
                Diagnostic::error(DiagnosticCode::SqlUnsupportedStatement, self.to_string())
                    .with_subject(name.clone())
            }
        }
    }
}
