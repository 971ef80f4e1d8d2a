//! Configuration schema (metricsql.toml)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::diagnostic::{DiagnosticCode, Severity};

/// SQL dialect used for parsing and canonical rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// Generic ANSI SQL
    #[default]
    Ansi,

    /// DuckDB SQL dialect
    DuckDb,

    /// PostgreSQL SQL dialect
    Postgres,

    /// BigQuery SQL dialect
    BigQuery,

    /// Snowflake SQL dialect
    Snowflake,
}

impl std::fmt::Display for DialectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ansi => write!(f, "ansi"),
            Self::DuckDb => write!(f, "duckdb"),
            Self::Postgres => write!(f, "postgres"),
            Self::BigQuery => write!(f, "bigquery"),
            Self::Snowflake => write!(f, "snowflake"),
        }
    }
}

/// Severity threshold overrides for specific diagnostic codes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of diagnostic code to severity override
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
}

impl SeverityThreshold {
    /// Get severity for a diagnostic code, or default
    pub fn get_severity(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_override(&mut self, code: DiagnosticCode, severity: Severity) {
        self.overrides.insert(code.as_str().to_string(), severity);
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// SQL dialect
    #[serde(default)]
    pub dialect: DialectConfig,

    /// Severity thresholds
    #[serde(default)]
    pub severity: SeverityThreshold,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
