//! Direct dependency extraction
//!
//! Collects the tables and views a CREATE VIEW / CREATE TABLE ... AS /
//! CREATE METRICS VIEW statement reads from. Only the FROM side is walked:
//! aliases are unwrapped, joins, nested joins, derived tables and every
//! branch of a set operation are followed. CTE names are not dependencies
//! within the query that declares them. Names are recorded without quotes.
//! The result is not transitive.

use crate::ast::{plain_name, Statement};
use sqlparser::ast::{Query, Select, SetExpr, TableFactor, TableWithJoins};
use std::collections::HashSet;

/// Walks a statement and records the relations it references
pub struct DependencyExtractor {
    /// CTE names in scope, lower-cased
    ctes: HashSet<String>,

    /// Referenced relations in first-seen order
    tables: Vec<String>,

    /// Lower-cased names already recorded
    seen: HashSet<String>,
}

impl DependencyExtractor {
    pub fn new() -> Self {
        Self {
            ctes: HashSet::new(),
            tables: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Direct dependencies of a statement, deduplicated case-insensitively
    pub fn extract(statement: &Statement) -> Vec<String> {
        let mut extractor = Self::new();
        extractor.visit_statement(statement);
        extractor.tables
    }

    fn visit_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Sql(sqlparser::ast::Statement::CreateView { query, .. }) => {
                self.visit_query(query);
            }
            Statement::Sql(sqlparser::ast::Statement::CreateTable(create)) => {
                if let Some(query) = &create.query {
                    self.visit_query(query);
                }
            }
            Statement::Sql(sqlparser::ast::Statement::Query(query)) => {
                self.visit_query(query);
            }
            Statement::CreateMetricsView(view) => {
                self.visit_from(&view.source);
            }
            _ => {}
        }
    }

    fn visit_query(&mut self, query: &Query) {
        let enclosing = self.ctes.clone();

        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
                self.visit_query(&cte.query);
            }
        }

        self.visit_set_expr(&query.body);
        self.ctes = enclosing;
    }

    fn visit_set_expr(&mut self, set_expr: &SetExpr) {
        match set_expr {
            SetExpr::Select(select) => self.visit_select(select),
            SetExpr::Query(query) => self.visit_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.visit_set_expr(left);
                self.visit_set_expr(right);
            }
            _ => {}
        }
    }

    fn visit_select(&mut self, select: &Select) {
        self.visit_from(&select.from);
    }

    fn visit_from(&mut self, from: &[TableWithJoins]) {
        for table_with_joins in from {
            self.visit_table_with_joins(table_with_joins);
        }
    }

    fn visit_table_with_joins(&mut self, table_with_joins: &TableWithJoins) {
        self.visit_table_factor(&table_with_joins.relation);
        for join in &table_with_joins.joins {
            self.visit_table_factor(&join.relation);
        }
    }

    fn visit_table_factor(&mut self, table_factor: &TableFactor) {
        match table_factor {
            TableFactor::Table { name, .. } => {
                let table_name = plain_name(name);
                let key = table_name.to_lowercase();

                if !self.ctes.contains(&key) && self.seen.insert(key) {
                    self.tables.push(table_name);
                }
            }
            TableFactor::Derived { subquery, .. } => self.visit_query(subquery),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.visit_table_with_joins(table_with_joins),
            _ => {}
        }
    }
}

impl Default for DependencyExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SqlParser;
    use pretty_assertions::assert_eq;

    fn dependencies(sql: &str) -> Vec<String> {
        let statement = SqlParser::new().parse_statement(sql).unwrap();
        DependencyExtractor::extract(&statement)
    }

    #[test]
    fn view_with_alias_and_joins() {
        assert_eq!(
            dependencies(
                "CREATE VIEW v AS SELECT * FROM orders AS o \
                 JOIN customers c ON o.cid = c.id LEFT JOIN (regions r JOIN zones z ON r.z = z.id) ON c.r = r.id"
            ),
            vec!["orders", "customers", "regions", "zones"]
        );
    }

    #[test]
    fn union_branches_and_subqueries() {
        assert_eq!(
            dependencies(
                "CREATE VIEW v AS SELECT a FROM t1 UNION ALL SELECT a FROM (SELECT a FROM t2) s \
                 UNION ALL SELECT a FROM T1"
            ),
            vec!["t1", "t2"]
        );
    }

    #[test]
    fn cte_names_are_not_dependencies() {
        assert_eq!(
            dependencies("CREATE VIEW v AS WITH base AS (SELECT * FROM raw.events) SELECT * FROM base"),
            vec!["raw.events"]
        );
    }

    #[test]
    fn cte_names_are_scoped_to_their_query() {
        assert_eq!(
            dependencies(
                "CREATE VIEW v AS SELECT * FROM \
                 (WITH base AS (SELECT * FROM raw) SELECT * FROM base) s \
                 JOIN base ON true"
            ),
            vec!["raw", "base"]
        );
    }

    #[test]
    fn quoted_names_are_recorded_without_quotes() {
        assert_eq!(
            dependencies("CREATE VIEW daily AS SELECT * FROM \"Events\" JOIN main.\"my table\" ON true"),
            vec!["Events", "main.my table"]
        );
    }

    #[test]
    fn table_as_select_and_metrics_view() {
        assert_eq!(
            dependencies("CREATE TABLE t AS SELECT * FROM src"),
            vec!["src"]
        );
        assert_eq!(
            dependencies("CREATE METRICS VIEW mv DIMENSIONS d MEASURES SUM(x) AS s FROM main.test"),
            vec!["main.test"]
        );
    }

    #[test]
    fn plain_table_has_no_dependencies() {
        assert!(dependencies("CREATE TABLE t (id INT)").is_empty());
    }
}
