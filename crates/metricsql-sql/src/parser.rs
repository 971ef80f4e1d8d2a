//! SQL parsing using datafusion-sqlparser-rs
//!
//! Standard statements are handed to `sqlparser`. The semantic layer's own
//! statements (`CREATE METRICS VIEW`, `CREATE SOURCE`, `DROP METRICS VIEW`)
//! are recognized up front and parsed from the same token stream.

use crate::ast::{CreateMetricsView, CreateSource, DropMetricsView, Statement};
use metricsql_core::{Diagnostic, DiagnosticCode, DialectConfig, Location, Severity};
use regex::Regex;
use sqlparser::ast::{Ident, SelectItem};
use sqlparser::dialect::{
    BigQueryDialect, Dialect, DuckDbDialect, GenericDialect, PostgreSqlDialect, SnowflakeDialect,
};
use sqlparser::keywords::{Keyword, ALL_KEYWORDS};
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::{Token, Tokenizer};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static LOCATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Line: (\d+), Column: (\d+)").unwrap());

/// SQL parser with configurable dialect
pub struct SqlParser {
    dialect: Box<dyn Dialect>,
}

impl SqlParser {
    /// Create a new SQL parser with the default (generic) dialect
    pub fn new() -> Self {
        Self {
            dialect: Box::new(GenericDialect {}),
        }
    }

    /// Create a SQL parser for DuckDB
    pub fn duckdb() -> Self {
        Self {
            dialect: Box::new(DuckDbDialect {}),
        }
    }

    /// Create a SQL parser for BigQuery
    pub fn bigquery() -> Self {
        Self {
            dialect: Box::new(BigQueryDialect {}),
        }
    }

    /// Create a SQL parser for PostgreSQL
    pub fn postgres() -> Self {
        Self {
            dialect: Box::new(PostgreSqlDialect {}),
        }
    }

    /// Create a SQL parser for Snowflake
    pub fn snowflake() -> Self {
        Self {
            dialect: Box::new(SnowflakeDialect {}),
        }
    }

    /// Create a parser from a dialect config
    pub fn from_dialect(dialect: &DialectConfig) -> Self {
        match dialect {
            DialectConfig::Ansi => Self::new(),
            DialectConfig::DuckDb => Self::duckdb(),
            DialectConfig::Postgres => Self::postgres(),
            DialectConfig::BigQuery => Self::bigquery(),
            DialectConfig::Snowflake => Self::snowflake(),
        }
    }

    /// Parse a `;`-separated batch of statements
    pub fn parse_statements(&self, sql: &str) -> Result<Vec<Statement>, ParseError> {
        self.parse_batch(sql)
            .map_err(|error| ParseError::new(sql, error))
    }

    /// Parse exactly one statement
    pub fn parse_statement(&self, sql: &str) -> Result<Statement, ParseError> {
        let mut statements = self.parse_statements(sql)?;
        if statements.len() != 1 {
            return Err(ParseError::new(
                sql,
                ParserError::ParserError(format!(
                    "Expected exactly one statement, found {}",
                    statements.len()
                )),
            ));
        }
        Ok(statements.remove(0))
    }

    /// Parse then render, giving the canonical text of every statement
    pub fn canonicalize(&self, sql: &str) -> Result<Vec<String>, ParseError> {
        Ok(self
            .parse_statements(sql)?
            .iter()
            .map(Statement::canonical)
            .collect())
    }

    /// Comparison form of a statement.
    ///
    /// The canonical text is re-tokenized; unquoted words (names, function
    /// names, keywords) are folded to lower case and every word is written
    /// with double quotes. Statements that differ only in letter case of
    /// unquoted words or in identifier quoting share a form. The result is a
    /// key for equality checks, not executable SQL.
    pub fn comparison_form(&self, statement: &Statement) -> Result<String, ParseError> {
        let sql = statement.canonical();
        let tokens = Tokenizer::new(&*self.dialect, &sql)
            .tokenize()
            .map_err(|error| ParseError::new(&sql, ParserError::from(error)))?;

        let words: Vec<String> = tokens
            .iter()
            .filter(|token| !matches!(token, Token::Whitespace(_)))
            .map(|token| match token {
                Token::Word(word) => {
                    let value = match word.quote_style {
                        Some(_) => word.value.clone(),
                        None => word.value.to_lowercase(),
                    };
                    Ident::with_quote('"', value).to_string()
                }
                other => other.to_string(),
            })
            .collect();

        Ok(words.join(" "))
    }

    /// Identifier for a bare name, quoted when the dialect would not read it
    /// back as written
    pub fn quote_ident(&self, value: &str) -> Ident {
        let mut chars = value.chars();
        let plain = chars
            .next()
            .is_some_and(|c| self.dialect.is_identifier_start(c))
            && chars.all(|c| self.dialect.is_identifier_part(c))
            && ALL_KEYWORDS
                .binary_search(&value.to_uppercase().as_str())
                .is_err();

        if plain {
            Ident::new(value)
        } else {
            let quote = self.dialect.identifier_quote_style(value).unwrap_or(
                if self.dialect.is_delimited_identifier_start('"') {
                    '"'
                } else {
                    '`'
                },
            );
            Ident::with_quote(quote, value)
        }
    }

    /// Parse SQL and return diagnostic on error
    pub fn parse_with_diagnostic(&self, sql: &str) -> Result<Vec<Statement>, Diagnostic> {
        self.parse_statements(sql).map_err(|e| e.to_diagnostic())
    }

    fn parse_batch(&self, sql: &str) -> Result<Vec<Statement>, ParserError> {
        let mut parser = Parser::new(&*self.dialect).try_with_sql(sql)?;
        let mut statements = Vec::new();
        let mut expecting_delimiter = false;

        loop {
            while parser.consume_token(&Token::SemiColon) {
                expecting_delimiter = false;
            }

            if parser.peek_token().token == Token::EOF {
                break;
            }
            if expecting_delimiter {
                return parser.expected("end of statement", parser.peek_token());
            }

            statements.push(parse_one(&mut parser)?);
            expecting_delimiter = true;
        }

        Ok(statements)
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_one(parser: &mut Parser<'_>) -> Result<Statement, ParserError> {
    if next_words_are(parser, &["CREATE", "METRICS", "VIEW"]) {
        skip_tokens(parser, 3);
        let view = parse_create_metrics_view(parser)?;
        tracing::debug!(
            view = %view.name,
            dimensions = view.dimensions.len(),
            measures = view.measures.len(),
            "parsed CREATE METRICS VIEW"
        );
        return Ok(Statement::CreateMetricsView(view));
    }
    if next_words_are(parser, &["CREATE", "SOURCE"]) {
        skip_tokens(parser, 2);
        let source = parse_create_source(parser)?;
        tracing::debug!(
            source = %source.name,
            properties = source.properties.len(),
            "parsed CREATE SOURCE"
        );
        return Ok(Statement::CreateSource(source));
    }
    if next_words_are(parser, &["DROP", "METRICS", "VIEW"]) {
        skip_tokens(parser, 3);
        let name = parser.parse_object_name(false)?;
        tracing::debug!(view = %name, "parsed DROP METRICS VIEW");
        return Ok(Statement::DropMetricsView(DropMetricsView { name }));
    }

    parser.parse_statement().map(Statement::Sql)
}

fn parse_create_metrics_view(parser: &mut Parser<'_>) -> Result<CreateMetricsView, ParserError> {
    let name = parser.parse_object_name(false)?;

    expect_word(parser, "DIMENSIONS")?;
    let dimensions = parser.parse_comma_separated(parse_definition_item)?;

    expect_word(parser, "MEASURES")?;
    let measures = parser.parse_comma_separated(parse_definition_item)?;

    parser.expect_keyword(Keyword::FROM)?;
    let source = parser.parse_comma_separated(Parser::parse_table_and_joins)?;

    Ok(CreateMetricsView {
        name,
        dimensions,
        measures,
        source,
    })
}

/// `<expr> [AS <ident>]`
fn parse_definition_item(parser: &mut Parser<'_>) -> Result<SelectItem, ParserError> {
    let expr = parser.parse_expr()?;
    if parser.parse_keyword(Keyword::AS) {
        let alias = parse_ident(parser)?;
        Ok(SelectItem::ExprWithAlias { expr, alias })
    } else {
        Ok(SelectItem::UnnamedExpr(expr))
    }
}

fn parse_create_source(parser: &mut Parser<'_>) -> Result<CreateSource, ParserError> {
    let name = parser.parse_object_name(false)?;
    parser.expect_keyword(Keyword::WITH)?;

    let parenthesized = parser.consume_token(&Token::LParen);
    let mut properties = BTreeMap::new();

    loop {
        let key = parse_property_key(parser)?;
        parser.expect_token(&Token::Eq)?;
        let value = parse_property_value(parser)?;
        properties.insert(key.to_lowercase(), value);

        if !parser.consume_token(&Token::Comma) {
            break;
        }
        // one trailing comma is allowed
        if matches!(
            parser.peek_token().token,
            Token::RParen | Token::SemiColon | Token::EOF
        ) {
            break;
        }
    }

    if parenthesized {
        parser.expect_token(&Token::RParen)?;
    }

    Ok(CreateSource { name, properties })
}

fn parse_property_key(parser: &mut Parser<'_>) -> Result<String, ParserError> {
    let token = parser.next_token();
    match &token.token {
        Token::SingleQuotedString(key) => Ok(key.clone()),
        Token::Word(word) if word.quote_style.is_none() => Ok(word.value.clone()),
        _ => parser.expected("property key", token),
    }
}

fn parse_property_value(parser: &mut Parser<'_>) -> Result<String, ParserError> {
    let token = parser.next_token();
    match &token.token {
        Token::SingleQuotedString(value) => Ok(value.clone()),
        _ => parser.expected("quoted property value", token),
    }
}

fn parse_ident(parser: &mut Parser<'_>) -> Result<Ident, ParserError> {
    let token = parser.next_token();
    match &token.token {
        Token::Word(word) => Ok(match word.quote_style {
            Some(quote) => Ident::with_quote(quote, word.value.clone()),
            None => Ident::new(word.value.clone()),
        }),
        _ => parser.expected("identifier", token),
    }
}

fn expect_word(parser: &mut Parser<'_>, expected: &str) -> Result<(), ParserError> {
    if next_words_are(parser, &[expected]) {
        parser.next_token();
        Ok(())
    } else {
        parser.expected(expected, parser.peek_token())
    }
}

fn next_words_are(parser: &Parser<'_>, words: &[&str]) -> bool {
    words.iter().enumerate().all(|(n, expected)| {
        matches!(
            &parser.peek_nth_token(n).token,
            Token::Word(word) if word.quote_style.is_none() && word.value.eq_ignore_ascii_case(expected)
        )
    })
}

fn skip_tokens(parser: &mut Parser<'_>, count: usize) {
    for _ in 0..count {
        parser.next_token();
    }
}

/// SQL parsing error with diagnostic information
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// Original SQL string
    pub sql: String,

    /// Parser error from sqlparser
    pub error: ParserError,
}

impl ParseError {
    pub fn new(sql: &str, error: ParserError) -> Self {
        Self {
            sql: sql.to_string(),
            error,
        }
    }

    /// Position reported by the parser, if any
    pub fn location(&self) -> Option<Location> {
        let message = self.error.to_string();
        let captures = LOCATION_PATTERN.captures(&message)?;
        let line = captures.get(1)?.as_str().parse().ok()?;
        let column = captures.get(2)?.as_str().parse().ok()?;
        Some(Location::new(line, column))
    }

    /// Convert to a diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(
            DiagnosticCode::SqlParseError,
            Severity::Error,
            format!("Failed to parse SQL: {}", self.error),
        )
        .with_optional_location(self.location())
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SQL parse error: {}", self.error)
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_simple_select() {
        let parser = SqlParser::new();
        let statement = parser
            .parse_statement("SELECT id, name FROM users WHERE active = true")
            .unwrap();

        assert_eq!(statement.kind_name(), "QUERY");
    }

    #[test]
    fn parse_batch_with_semicolons() {
        let parser = SqlParser::new();
        let statements = parser
            .parse_statements("CREATE VIEW a AS SELECT 1;; CREATE TABLE b (x INT);")
            .unwrap();

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].kind_name(), "CREATE VIEW");
        assert_eq!(statements[1].kind_name(), "CREATE TABLE");
    }

    #[test]
    fn parse_metrics_view() {
        let parser = SqlParser::new();
        let statement = parser
            .parse_statement(
                "create metrics view mv dimensions d1, d2 as x measures count(*) as c from main.t",
            )
            .unwrap();

        let Statement::CreateMetricsView(view) = statement else {
            panic!("expected metrics view");
        };
        assert_eq!(view.name.to_string(), "mv");
        assert_eq!(view.dimensions.len(), 2);
        assert_eq!(view.measures.len(), 1);
        assert_eq!(
            view.to_string(),
            "CREATE METRICS VIEW mv DIMENSIONS d1, d2 AS x MEASURES count(*) AS c FROM main.t"
        );
    }

    #[test]
    fn metrics_view_requires_measures() {
        let parser = SqlParser::new();
        let result = parser.parse_statement("CREATE METRICS VIEW mv DIMENSIONS d1 FROM t");
        assert!(result.is_err());
    }

    #[test]
    fn parse_source_variants() {
        let parser = SqlParser::new();

        let bare = parser
            .parse_statement("CREATE SOURCE s WITH connector = 's3', 'prefix' = 'p', FORMAT = 'csv'")
            .unwrap();
        let wrapped = parser
            .parse_statement("CREATE SOURCE s WITH ('connector' = 's3', prefix = 'p', format = 'csv',)")
            .unwrap();

        assert_eq!(bare, wrapped);
        assert_eq!(
            bare.canonical(),
            "CREATE SOURCE s WITH ('connector' = 's3', 'format' = 'csv', 'prefix' = 'p')"
        );
    }

    #[test]
    fn source_rejects_doubled_comma() {
        let parser = SqlParser::new();
        let result = parser.parse_statement("CREATE SOURCE s WITH (connector = 's3',, prefix = 'p')");
        assert!(result.is_err());
    }

    #[test]
    fn source_rejects_unquoted_value() {
        let parser = SqlParser::new();
        let result = parser.parse_statement("CREATE SOURCE s WITH (connector = s3)");
        assert!(result.is_err());
    }

    #[test]
    fn parse_drop_metrics_view() {
        let parser = SqlParser::new();
        let statement = parser.parse_statement("drop metrics view Sales").unwrap();
        assert_eq!(statement.canonical(), "DROP METRICS VIEW Sales");
    }

    #[test]
    fn parse_statement_rejects_batches() {
        let parser = SqlParser::new();
        assert!(parser.parse_statement("SELECT 1; SELECT 2").is_err());
        assert!(parser.parse_statement("").is_err());
    }

    #[test]
    fn parse_invalid_sql_has_location() {
        let parser = SqlParser::new();
        let error = parser.parse_statement("SELECT a FROM\nWHERE").unwrap_err();

        let diag = error.to_diagnostic();
        assert_eq!(diag.code, DiagnosticCode::SqlParseError);
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.location.map(|l| l.line), Some(2));
    }

    #[test]
    fn different_dialects() {
        let sql = "SELECT id FROM users";

        for dialect in [
            DialectConfig::Ansi,
            DialectConfig::DuckDb,
            DialectConfig::Postgres,
            DialectConfig::BigQuery,
            DialectConfig::Snowflake,
        ] {
            assert!(SqlParser::from_dialect(&dialect).parse_statement(sql).is_ok());
        }
    }

    #[test]
    fn comparison_form_ignores_quoting_and_case() {
        let parser = SqlParser::new();
        let form = |sql: &str| {
            parser
                .comparison_form(&parser.parse_statement(sql).unwrap())
                .unwrap()
        };

        assert_eq!(
            form("CREATE VIEW \"v\" AS SELECT \"a\" FROM \"t\""),
            form("CREATE VIEW v AS SELECT a FROM t")
        );
        assert_eq!(
            form("create view v as select count(*) from t"),
            form("CREATE VIEW V AS SELECT COUNT(*) FROM T")
        );
        assert_eq!(
            form("CREATE METRICS VIEW mv DIMENSIONS d MEASURES sum(x) AS s FROM t"),
            form("CREATE METRICS VIEW MV DIMENSIONS D MEASURES SUM(X) AS S FROM T")
        );
    }

    #[test]
    fn comparison_form_keeps_quoted_case_and_literals() {
        let parser = SqlParser::new();
        let form = |sql: &str| {
            parser
                .comparison_form(&parser.parse_statement(sql).unwrap())
                .unwrap()
        };

        assert_ne!(
            form("CREATE VIEW \"V\" AS SELECT 1"),
            form("CREATE VIEW v AS SELECT 1")
        );
        assert_ne!(
            form("CREATE VIEW v AS SELECT 'A'"),
            form("CREATE VIEW v AS SELECT 'a'")
        );
    }

    #[test]
    fn quote_ident_only_when_needed() {
        let parser = SqlParser::new();

        assert_eq!(parser.quote_ident("Sales").to_string(), "Sales");
        assert_eq!(parser.quote_ident("sales-v2").to_string(), "\"sales-v2\"");
        assert_eq!(parser.quote_ident("my view").to_string(), "\"my view\"");
        assert_eq!(parser.quote_ident("select").to_string(), "\"select\"");
        assert_eq!(SqlParser::bigquery().quote_ident("a-b").to_string(), "`a-b`");
    }
}
