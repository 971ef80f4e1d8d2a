//! Connector validation for source declarations
//!
//! A source names its connector with the `connector` property. Each
//! connector checks the properties it needs; storage and connection details
//! are not handled here.

use metricsql_core::{Diagnostic, DiagnosticCode};
use std::collections::{BTreeMap, HashMap};

/// Property naming the connector of a source
pub const CONNECTOR_PROPERTY: &str = "connector";

/// Validates the properties of one connector type
pub trait ConnectorValidator: Send + Sync {
    /// Connector type, matched against the `connector` property
    fn name(&self) -> &'static str;

    /// Check the source properties (keys are lower-cased)
    fn validate(&self, properties: &BTreeMap<String, String>) -> Result<(), ValidationError>;
}

/// S3 bucket connector
pub struct S3Connector;

impl S3Connector {
    pub const REQUIRED: &'static [&'static str] = &["prefix", "format"];
    pub const OPTIONAL: &'static [&'static str] = &["aws.access.key", "aws.secret.key"];
    pub const FORMATS: &'static [&'static str] = &["csv", "parquet"];
}

impl ConnectorValidator for S3Connector {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn validate(&self, properties: &BTreeMap<String, String>) -> Result<(), ValidationError> {
        for property in Self::REQUIRED {
            if properties.get(*property).map_or(true, |value| value.trim().is_empty()) {
                return Err(ValidationError::MissingRequiredProperty {
                    property: property.to_string(),
                    connector: self.name().to_string(),
                });
            }
        }

        for property in Self::OPTIONAL {
            if properties.get(*property).is_some_and(|value| value.trim().is_empty()) {
                return Err(ValidationError::BlankOptionalProperty {
                    property: property.to_string(),
                    connector: self.name().to_string(),
                });
            }
        }

        let format = properties.get("format").map(String::as_str).unwrap_or_default();
        if !Self::FORMATS.iter().any(|f| f.eq_ignore_ascii_case(format)) {
            return Err(ValidationError::UnsupportedFormat {
                format: format.to_string(),
                supported: Self::FORMATS.join(", "),
            });
        }

        Ok(())
    }
}

/// Registered connectors, looked up by type
pub struct ConnectorRegistry {
    connectors: HashMap<String, Box<dyn ConnectorValidator>>,
}

impl ConnectorRegistry {
    /// Registry with no connectors
    pub fn empty() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Add a connector, replacing any with the same name
    pub fn register(&mut self, connector: Box<dyn ConnectorValidator>) {
        self.connectors
            .insert(connector.name().to_lowercase(), connector);
    }

    pub fn with_connector(mut self, connector: Box<dyn ConnectorValidator>) -> Self {
        self.register(connector);
        self
    }

    /// Validate the properties of a source
    pub fn validate(
        &self,
        source: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), ValidationError> {
        let Some(connector_type) = properties.get(CONNECTOR_PROPERTY) else {
            return Err(ValidationError::MissingConnector {
                source_name: source.to_string(),
            });
        };

        let Some(connector) = self.connectors.get(&connector_type.to_lowercase()) else {
            return Err(ValidationError::UnknownConnector {
                connector: connector_type.clone(),
                source_name: source.to_string(),
            });
        };

        tracing::debug!(source, connector = connector.name(), "validating source properties");
        connector.validate(properties)
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::empty().with_connector(Box::new(S3Connector))
    }
}

/// Source properties rejected by validation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Required property [connector] not found for source [{source_name}]")]
    MissingConnector { source_name: String },

    #[error("No connector of type [{connector}] found for source [{source_name}]")]
    UnknownConnector { connector: String, source_name: String },

    #[error("Required property [{property}] not present or blank for {connector} connector")]
    MissingRequiredProperty { property: String, connector: String },

    #[error("Optional property [{property}] is blank for {connector} connector")]
    BlankOptionalProperty { property: String, connector: String },

    #[error("Format [{format}] not supported, supported formats are [{supported}]")]
    UnsupportedFormat { format: String, supported: String },
}

impl ValidationError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(DiagnosticCode::SourceValidation, self.to_string())
    }
}
