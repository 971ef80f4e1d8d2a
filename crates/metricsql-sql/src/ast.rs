//! Statement model
//!
//! Standard SQL is represented by `sqlparser`'s AST. The semantic layer adds
//! three statements of its own, kept alongside as a closed sum type.

use sqlparser::ast::{ObjectName, SelectItem, TableWithJoins, Value};
use std::collections::BTreeMap;
use std::fmt;

/// One parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Any statement the SQL parser understands natively
    Sql(sqlparser::ast::Statement),

    /// `CREATE METRICS VIEW`
    CreateMetricsView(CreateMetricsView),

    /// `CREATE SOURCE`
    CreateSource(CreateSource),

    /// `DROP METRICS VIEW`
    DropMetricsView(DropMetricsView),
}

impl Statement {
    /// Short kind name used in logs and error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Sql(sqlparser::ast::Statement::Query(_)) => "QUERY",
            Statement::Sql(sqlparser::ast::Statement::CreateView { .. }) => "CREATE VIEW",
            Statement::Sql(sqlparser::ast::Statement::CreateTable(_)) => "CREATE TABLE",
            Statement::Sql(sqlparser::ast::Statement::Drop { .. }) => "DROP",
            Statement::Sql(_) => "SQL",
            Statement::CreateMetricsView(_) => "CREATE METRICS VIEW",
            Statement::CreateSource(_) => "CREATE SOURCE",
            Statement::DropMetricsView(_) => "DROP METRICS VIEW",
        }
    }

    /// Canonical text: the statement rendered back to SQL
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Sql(statement) => write!(f, "{statement}"),
            Statement::CreateMetricsView(view) => write!(f, "{view}"),
            Statement::CreateSource(source) => write!(f, "{source}"),
            Statement::DropMetricsView(drop) => write!(f, "{drop}"),
        }
    }
}

/// `CREATE METRICS VIEW <name> DIMENSIONS ... MEASURES ... FROM ...`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateMetricsView {
    pub name: ObjectName,

    /// Dimension expressions, each optionally aliased
    pub dimensions: Vec<SelectItem>,

    /// Measure expressions, each optionally aliased
    pub measures: Vec<SelectItem>,

    /// The relation the view is defined over
    pub source: Vec<TableWithJoins>,
}

impl fmt::Display for CreateMetricsView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CREATE METRICS VIEW {} DIMENSIONS {} MEASURES {} FROM {}",
            self.name,
            comma_separated(&self.dimensions),
            comma_separated(&self.measures),
            comma_separated(&self.source),
        )
    }
}

/// `CREATE SOURCE <name> WITH (<key> = '<value>', ...)`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSource {
    pub name: ObjectName,

    /// Properties keyed by lower-cased key; sorted for stable rendering
    pub properties: BTreeMap<String, String>,
}

impl CreateSource {
    /// Look up a property by key, ignoring case
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(&key.to_lowercase()).map(String::as_str)
    }
}

impl fmt::Display for CreateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let properties: Vec<String> = self
            .properties
            .iter()
            .map(|(key, value)| {
                format!(
                    "{} = {}",
                    Value::SingleQuotedString(key.clone()),
                    Value::SingleQuotedString(value.clone())
                )
            })
            .collect();

        write!(f, "CREATE SOURCE {} WITH ({})", self.name, properties.join(", "))
    }
}

/// `DROP METRICS VIEW <name>`
#[derive(Debug, Clone, PartialEq)]
pub struct DropMetricsView {
    pub name: ObjectName,
}

impl fmt::Display for DropMetricsView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DROP METRICS VIEW {}", self.name)
    }
}

pub(crate) fn comma_separated<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Last part of a possibly qualified name, as written
pub fn simple_name(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_default()
}

/// Dotted name without quotes, used as a lookup key
pub fn plain_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.as_str())
        .collect::<Vec<_>>()
        .join(".")
}
