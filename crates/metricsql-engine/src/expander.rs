//! Metrics view query expansion
//!
//! Rewrites a query that selects from a stored metrics view into the
//! equivalent grouped query over the view's source:
//!
//! ```text
//! SELECT DIM1, M_DIST FROM METRICS_VIEW
//!   => SELECT DIM1, COUNT(DISTINCT DIM1) AS M_DIST FROM MAIN.TEST GROUP BY 1
//! ```
//!
//! Dimensions are moved ahead of measures (keeping their relative order) so
//! the GROUP BY can use ordinals. WHERE, HAVING, ORDER BY and LIMIT are left
//! as written.

use metricsql_catalog::{ArtifactKind, ArtifactStore};
use metricsql_core::{Diagnostic, DiagnosticCode, Location};
use metricsql_sql::{plain_name, DefinitionError, MetricsViewDefinition, SqlParser, Statement};
use sqlparser::ast::{
    Expr, GroupByExpr, Ident, ObjectName, Query, Select, SelectItem, SetExpr, Spanned,
    TableFactor, Value,
};

/// Expands metrics view references against an artifact store
pub struct MetricsViewExpander<'a> {
    store: &'a dyn ArtifactStore,
    parser: &'a SqlParser,
}

impl<'a> MetricsViewExpander<'a> {
    pub fn new(store: &'a dyn ArtifactStore, parser: &'a SqlParser) -> Self {
        Self { store, parser }
    }

    /// Expand a statement. Anything other than a query is returned as is.
    pub fn expand(&self, statement: Statement) -> Result<Statement, ExpansionError> {
        match statement {
            Statement::Sql(sqlparser::ast::Statement::Query(mut query)) => {
                self.expand_query(&mut query)?;
                Ok(Statement::Sql(sqlparser::ast::Statement::Query(query)))
            }
            other => Ok(other),
        }
    }

    /// Expand a query in place
    pub fn expand_query(&self, query: &mut Query) -> Result<(), ExpansionError> {
        if let Some(with) = &mut query.with {
            for cte in &mut with.cte_tables {
                self.expand_query(&mut cte.query)?;
            }
        }

        match query.body.as_mut() {
            SetExpr::Select(select) => self.expand_select(select),
            SetExpr::Query(inner) => self.expand_query(inner),
            _ => Ok(()),
        }
    }

    fn expand_select(&self, select: &mut Select) -> Result<(), ExpansionError> {
        let [from] = select.from.as_mut_slice() else {
            return Ok(());
        };
        if !from.joins.is_empty() {
            return Ok(());
        }

        let view_name = match &mut from.relation {
            TableFactor::Derived { subquery, .. } => return self.expand_query(subquery),
            TableFactor::Table { name, .. } => name.clone(),
            _ => return Ok(()),
        };

        let Some(artifact) = self.store.get(ArtifactKind::MetricsView, &plain_name(&view_name))
        else {
            return Ok(());
        };
        let definition = MetricsViewDefinition::from_ddl(self.parser, &artifact.payload)?;

        let (dimensions, aggregates) = resolve_projection(&select.projection, &definition, &view_name)?;

        tracing::debug!(
            view = %view_name,
            dimensions = dimensions.len(),
            measures = aggregates.len(),
            "expanding metrics view reference"
        );

        if !aggregates.is_empty() && !dimensions.is_empty() {
            let ordinals = (1..=dimensions.len())
                .map(|n| Expr::Value(Value::Number(n.to_string(), false)))
                .collect();
            select.group_by = GroupByExpr::Expressions(ordinals, vec![]);
        }

        select.projection = dimensions.into_iter().chain(aggregates).collect();
        select.from = definition.source;

        Ok(())
    }
}

/// Split the projection into expanded dimensions and measures
fn resolve_projection(
    projection: &[SelectItem],
    definition: &MetricsViewDefinition,
    view_name: &ObjectName,
) -> Result<(Vec<SelectItem>, Vec<SelectItem>), ExpansionError> {
    if let Some(star) = projection
        .iter()
        .find(|item| matches!(item, SelectItem::Wildcard(_)))
    {
        if projection.len() != 1 {
            return Err(ExpansionError::StarWithColumns {
                view: view_name.to_string(),
                location: span_location(star),
            });
        }

        return Ok((
            definition.dimensions.values().map(|c| c.to_select_item(None)).collect(),
            definition.measures.values().map(|c| c.to_select_item(None)).collect(),
        ));
    }

    let mut dimensions = Vec::new();
    let mut aggregates = Vec::new();

    for item in projection {
        let not_found = || ExpansionError::ColumnNotFound {
            column: item_text(item),
            view: view_name.to_string(),
            location: span_location(item),
        };

        let (key, alias) = query_key(item).ok_or_else(not_found)?;

        if let Some(measure) = definition.measures.get(&key) {
            aggregates.push(measure.to_select_item(alias));
        } else if let Some(dimension) = definition.dimensions.get(&key) {
            dimensions.push(dimension.to_select_item(alias));
        } else {
            return Err(not_found());
        }
    }

    Ok((dimensions, aggregates))
}

/// A query-side item names a view column by the identifier before any alias
fn query_key(item: &SelectItem) -> Option<(String, Option<Ident>)> {
    match item {
        SelectItem::UnnamedExpr(Expr::Identifier(ident)) => Some((ident.value.clone(), None)),
        SelectItem::ExprWithAlias {
            expr: Expr::Identifier(ident),
            alias,
        } => Some((ident.value.clone(), Some(alias.clone()))),
        _ => None,
    }
}

fn item_text(item: &SelectItem) -> String {
    match item {
        SelectItem::ExprWithAlias { expr, .. } => expr.to_string(),
        other => other.to_string(),
    }
}

fn span_location(item: &SelectItem) -> Option<Location> {
    let span = item.span();
    if span.start.line == 0 {
        return None;
    }

    Some(Location::with_range(
        span.start.line as usize,
        span.start.column as usize,
        span.end.line as usize,
        span.end.column as usize,
    ))
}

/// Query expansion errors
#[derive(Debug, thiserror::Error)]
pub enum ExpansionError {
    #[error("Column [{column}] not present in metrics view [{view}]")]
    ColumnNotFound {
        column: String,
        view: String,
        location: Option<Location>,
    },

    #[error("Cannot specify columns along with * for metrics view [{view}]")]
    StarWithColumns {
        view: String,
        location: Option<Location>,
    },

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

impl ExpansionError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::ColumnNotFound { view, location, .. } => {
                Diagnostic::error(DiagnosticCode::MetricsViewUnknownColumn, self.to_string())
                    .with_optional_location(location.clone())
                    .with_subject(view.clone())
            }
            Self::StarWithColumns { view, location } => {
                Diagnostic::error(DiagnosticCode::MetricsViewStarWithColumns, self.to_string())
                    .with_optional_location(location.clone())
                    .with_subject(view.clone())
            }
            Self::Definition(error) => error.to_diagnostic(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricsql_catalog::{Artifact, InMemoryArtifactStore};
    use pretty_assertions::assert_eq;

    const VIEW: &str = "CREATE METRICS VIEW mv DIMENSIONS d1, UPPER(d2) AS d2 \
                        MEASURES SUM(x) AS total FROM base";

    fn store() -> InMemoryArtifactStore {
        InMemoryArtifactStore::from_artifacts(vec![Artifact::new(
            ArtifactKind::MetricsView,
            "mv",
            VIEW,
        )])
    }

    fn expand(sql: &str) -> Result<String, ExpansionError> {
        let parser = SqlParser::new();
        let store = store();
        let expander = MetricsViewExpander::new(&store, &parser);
        let statement = parser.parse_statement(sql).unwrap();
        expander.expand(statement).map(|s| s.to_string())
    }

    #[test]
    fn dimension_and_measure() {
        assert_eq!(
            expand("SELECT total, d2 FROM mv").unwrap(),
            "SELECT UPPER(d2) AS d2, SUM(x) AS total FROM base GROUP BY 1"
        );
    }

    #[test]
    fn unrelated_tables_are_untouched() {
        assert_eq!(
            expand("SELECT d1, total FROM other").unwrap(),
            "SELECT d1, total FROM other"
        );
        assert_eq!(expand("SELECT 1").unwrap(), "SELECT 1");
    }

    #[test]
    fn joins_are_not_expanded() {
        assert_eq!(
            expand("SELECT d1 FROM mv JOIN other ON true").unwrap(),
            "SELECT d1 FROM mv JOIN other ON true"
        );
    }

    #[test]
    fn comma_separated_from_is_not_expanded() {
        assert_eq!(
            expand("SELECT d1 FROM mv, other").unwrap(),
            "SELECT d1 FROM mv, other"
        );
        assert_eq!(
            expand("SELECT total FROM other, mv").unwrap(),
            "SELECT total FROM other, mv"
        );
    }

    #[test]
    fn unknown_column_has_location() {
        let error = expand("SELECT d1,\n  nope FROM mv").unwrap_err();

        assert_eq!(error.to_string(), "Column [nope] not present in metrics view [mv]");
        let diag = error.to_diagnostic();
        assert_eq!(diag.code, DiagnosticCode::MetricsViewUnknownColumn);
        assert_eq!(diag.location.map(|l| (l.line, l.column)), Some((2, 3)));
    }

    #[test]
    fn expression_over_view_column_is_not_resolvable() {
        let error = expand("SELECT d1 + 1 AS x FROM mv").unwrap_err();
        assert_eq!(error.to_string(), "Column [d1 + 1] not present in metrics view [mv]");
    }

    #[test]
    fn corrupt_definition_is_reported() {
        let parser = SqlParser::new();
        let store = InMemoryArtifactStore::from_artifacts(vec![Artifact::new(
            ArtifactKind::MetricsView,
            "broken",
            "CREATE METRICS VIEW broken DIMENSIONS d1 MEASURES SUM(x) FROM t",
        )]);
        let expander = MetricsViewExpander::new(&store, &parser);

        let error = expander
            .expand(parser.parse_statement("SELECT d1 FROM broken").unwrap())
            .unwrap_err();

        assert!(matches!(error, ExpansionError::Definition(_)));
        assert_eq!(error.to_diagnostic().code, DiagnosticCode::MetricsViewDefinition);
    }
}
