//! Metrics view model
//!
//! Built from a parsed `CREATE METRICS VIEW`. Every dimension and measure is
//! keyed by its user-visible name: a bare identifier's own name, or the alias
//! of an aliased expression. Keys are case-insensitive and a later duplicate
//! replaces an earlier one.

use crate::ast::{comma_separated, simple_name, CreateMetricsView, Statement};
use crate::parser::{ParseError, SqlParser};
use metricsql_core::{Diagnostic, DiagnosticCode, OrderedMap};
use sqlparser::ast::{Expr, Ident, ObjectName, SelectItem, TableWithJoins};

/// One dimension or measure of a metrics view
#[derive(Debug, Clone, PartialEq)]
pub struct ViewColumn {
    /// Defining expression
    pub expr: Expr,

    /// Alias given in the definition, if any
    pub alias: Option<Ident>,
}

impl ViewColumn {
    /// Projection item for this column. A query-side alias wins over the
    /// alias from the definition.
    pub fn to_select_item(&self, query_alias: Option<Ident>) -> SelectItem {
        match query_alias.or_else(|| self.alias.clone()) {
            Some(alias) => SelectItem::ExprWithAlias {
                expr: self.expr.clone(),
                alias,
            },
            None => SelectItem::UnnamedExpr(self.expr.clone()),
        }
    }
}

/// Interpreted metrics view
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsViewDefinition {
    pub name: ObjectName,
    pub dimensions: OrderedMap<ViewColumn>,
    pub measures: OrderedMap<ViewColumn>,
    pub source: Vec<TableWithJoins>,
}

impl MetricsViewDefinition {
    /// Build the model from a parsed statement
    pub fn from_statement(statement: &CreateMetricsView) -> Result<Self, DefinitionError> {
        Ok(Self {
            name: statement.name.clone(),
            dimensions: collect_columns(&statement.dimensions)?,
            measures: collect_columns(&statement.measures)?,
            source: statement.source.clone(),
        })
    }

    /// Parse stored DDL and build the model
    pub fn from_ddl(parser: &SqlParser, ddl: &str) -> Result<Self, DefinitionError> {
        match parser.parse_statement(ddl)? {
            Statement::CreateMetricsView(view) => Self::from_statement(&view),
            other => Err(DefinitionError::NotAMetricsView {
                statement: other.kind_name().to_string(),
            }),
        }
    }

    /// View name as written, without qualifiers
    pub fn simple_name(&self) -> String {
        simple_name(&self.name)
    }

    /// One grouped query per measure, selecting every dimension plus that
    /// measure from the view's source
    pub fn validation_queries(&self) -> Vec<String> {
        let dimensions: Vec<SelectItem> = self
            .dimensions
            .values()
            .map(|column| column.to_select_item(None))
            .collect();
        let ordinals: Vec<String> = (1..=dimensions.len()).map(|n| n.to_string()).collect();

        self.measures
            .values()
            .map(|measure| {
                let mut items = dimensions.clone();
                items.push(measure.to_select_item(None));

                let mut sql = format!(
                    "SELECT {} FROM {}",
                    comma_separated(&items),
                    comma_separated(&self.source)
                );
                if !ordinals.is_empty() {
                    sql.push_str(" GROUP BY ");
                    sql.push_str(&ordinals.join(", "));
                }
                sql
            })
            .collect()
    }
}

fn collect_columns(items: &[SelectItem]) -> Result<OrderedMap<ViewColumn>, DefinitionError> {
    let mut columns = OrderedMap::new();

    for item in items {
        let (key, column) = match item {
            SelectItem::UnnamedExpr(Expr::Identifier(ident)) => (
                ident.value.clone(),
                ViewColumn {
                    expr: Expr::Identifier(ident.clone()),
                    alias: None,
                },
            ),
            SelectItem::ExprWithAlias { expr, alias } => (
                alias.value.clone(),
                ViewColumn {
                    expr: expr.clone(),
                    alias: Some(alias.clone()),
                },
            ),
            other => {
                return Err(DefinitionError::MissingIdentifier {
                    node: other.to_string(),
                })
            }
        };

        columns.insert(&key, column);
    }

    Ok(columns)
}

/// A metrics view definition that cannot be interpreted
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("cannot find identifier for node {node}")]
    MissingIdentifier { node: String },

    #[error("expected CREATE METRICS VIEW, found {statement}")]
    NotAMetricsView { statement: String },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl DefinitionError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Parse(error) => error.to_diagnostic(),
            other => Diagnostic::error(DiagnosticCode::MetricsViewDefinition, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn definition(sql: &str) -> Result<MetricsViewDefinition, DefinitionError> {
        MetricsViewDefinition::from_ddl(&SqlParser::new(), sql)
    }

    #[test]
    fn keys_follow_identifier_or_alias() {
        let view = definition(
            "CREATE METRICS VIEW mv DIMENSIONS DIM1, ceil(MET1) AS Dim3 \
             MEASURES COUNT(DISTINCT DIM1) AS M_DIST FROM main.test",
        )
        .unwrap();

        assert_eq!(view.dimensions.keys().collect::<Vec<_>>(), vec!["dim1", "dim3"]);
        assert_eq!(view.measures.keys().collect::<Vec<_>>(), vec!["m_dist"]);
        assert_eq!(view.simple_name(), "mv");
    }

    #[test]
    fn unnamed_expression_is_rejected() {
        let error = definition("CREATE METRICS VIEW mv DIMENSIONS DIM1 MEASURES COUNT(*) FROM t")
            .unwrap_err();

        assert_eq!(error.to_string(), "cannot find identifier for node COUNT(*)");
        assert_eq!(error.to_diagnostic().code, DiagnosticCode::MetricsViewDefinition);
    }

    #[test]
    fn compound_identifier_is_rejected() {
        let error = definition("CREATE METRICS VIEW mv DIMENSIONS t.DIM1 MEASURES SUM(x) AS s FROM t")
            .unwrap_err();

        assert!(matches!(error, DefinitionError::MissingIdentifier { .. }));
    }

    #[test]
    fn later_duplicate_replaces_earlier() {
        let view = definition(
            "CREATE METRICS VIEW mv DIMENSIONS a, b, UPPER(c) AS A MEASURES SUM(x) AS s FROM t",
        )
        .unwrap();

        assert_eq!(view.dimensions.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(
            view.dimensions.get("a").unwrap().to_select_item(None).to_string(),
            "UPPER(c) AS A"
        );
    }

    #[test]
    fn not_a_metrics_view() {
        let error = definition("CREATE VIEW v AS SELECT 1").unwrap_err();
        assert!(matches!(error, DefinitionError::NotAMetricsView { .. }));
    }

    #[test]
    fn validation_query_per_measure() {
        let view = definition(
            "CREATE METRICS VIEW mv DIMENSIONS d1, d2 MEASURES SUM(x) AS s, MAX(y) AS m FROM t",
        )
        .unwrap();

        assert_eq!(
            view.validation_queries(),
            vec![
                "SELECT d1, d2, SUM(x) AS s FROM t GROUP BY 1, 2".to_string(),
                "SELECT d1, d2, MAX(y) AS m FROM t GROUP BY 1, 2".to_string(),
            ]
        );
    }
}
