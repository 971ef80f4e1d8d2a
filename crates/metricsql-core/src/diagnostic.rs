//! Diagnostic codes and error reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Parsing (1xxx)
    /// Failed to parse SQL
    SqlParseError,

    /// Statement kind is not accepted in this position
    SqlUnsupportedStatement,

    // Metrics views (2xxx)
    /// A stored or declared metrics view cannot be interpreted
    MetricsViewDefinition,

    /// Query references a column the metrics view does not expose
    MetricsViewUnknownColumn,

    /// `*` combined with explicit columns against a metrics view
    MetricsViewStarWithColumns,

    // Catalog (3xxx)
    /// Artifact with the same kind and name already exists
    CatalogDuplicateArtifact,

    /// Existing-state catalog document could not be read
    CatalogDocumentInvalid,

    // Validation (4xxx)
    /// Source properties rejected by its connector
    SourceValidation,

    /// Query rejected by the semantic validator
    QueryValidation,

    // General warnings (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlParseError => "SQL_PARSE_ERROR",
            Self::SqlUnsupportedStatement => "SQL_UNSUPPORTED_STATEMENT",
            Self::MetricsViewDefinition => "METRICS_VIEW_DEFINITION",
            Self::MetricsViewUnknownColumn => "METRICS_VIEW_UNKNOWN_COLUMN",
            Self::MetricsViewStarWithColumns => "METRICS_VIEW_STAR_WITH_COLUMNS",
            Self::CatalogDuplicateArtifact => "CATALOG_DUPLICATE_ARTIFACT",
            Self::CatalogDocumentInvalid => "CATALOG_DOCUMENT_INVALID",
            Self::SourceValidation => "SOURCE_VALIDATION",
            Self::QueryValidation => "QUERY_VALIDATION",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - the request was rejected
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Position inside the submitted SQL text (1-indexed)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,

    pub column: usize,

    /// Optional end line (for ranges)
    pub end_line: Option<usize>,

    /// Optional end column (for ranges)
    pub end_column: Option<usize>,
}

impl Location {
    /// Create a location pointing at a single line and column
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            line,
            column,
            end_line: None,
            end_column: None,
        }
    }

    /// Create a location covering a range
    pub fn with_range(line: usize, column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            line,
            column,
            end_line: Some(end_line),
            end_column: Some(end_column),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Entity the diagnostic is about (metrics view, source, table)
    pub subject: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            subject: None,
        }
    }

    /// Shorthand for an error-level diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the location if one is known
    pub fn with_optional_location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    /// Set the subject entity
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " at {}", location)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        // Ensure codes are stable strings
        assert_eq!(DiagnosticCode::SqlParseError.as_str(), "SQL_PARSE_ERROR");
        assert_eq!(
            DiagnosticCode::MetricsViewUnknownColumn.as_str(),
            "METRICS_VIEW_UNKNOWN_COLUMN"
        );
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::error(
            DiagnosticCode::MetricsViewUnknownColumn,
            "Column [DIM4] not present in metrics view [METRICS_VIEW]",
        )
        .with_location(Location::new(1, 30))
        .with_subject("METRICS_VIEW");

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("METRICS_VIEW_UNKNOWN_COLUMN"));
        assert!(json.contains("\"error\""));
        assert!(json.contains("\"line\":1"));
    }

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::error(DiagnosticCode::SqlParseError, "unexpected token")
            .with_location(Location::with_range(2, 5, 2, 9));

        assert_eq!(
            diag.to_string(),
            "error[SQL_PARSE_ERROR]: unexpected token at line 2, column 5"
        );
    }
}
