//! Configuration-class errors.
//!
//! These are raised eagerly while a recipe's schema configuration is parsed,
//! before any batch is processed. Validation-class issues are never errors;
//! they are returned as data in [`crate::ValidationResult`].

use thiserror::Error;

/// Errors raised when schema configuration can never be satisfied by any input.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Unsupported type name: '{0}'. Supported types: str, string, int, integer, float, double, bool, boolean, datetime, timestamp, date, list<T>, struct<name: T, ...>")]
    UnknownType(String),

    #[error("Malformed type expression '{expression}': {reason}")]
    InvalidTypeExpression { expression: String, reason: String },

    #[error("Invalid contract mode: '{0}'. Expected: evolve, freeze, discard_rows, or discard_columns")]
    InvalidContractMode(String),

    #[error("Invalid reflection level: '{0}'. Expected: none, shallow, one, deep, or full")]
    InvalidReflectionLevel(String),

    #[error("Invalid schema mode: '{0}'. Expected: strict, lenient, or infer")]
    InvalidSchemaMode(String),

    #[error("Schema has duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("Schema has a column with empty name")]
    EmptyColumnName,

    #[error("Invalid schema configuration: {message}")]
    InvalidConfig {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SchemaError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        SchemaError::InvalidConfig {
            message: message.into(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        SchemaError::InvalidConfig {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml::Error> for SchemaError {
    fn from(err: serde_yaml::Error) -> Self {
        SchemaError::InvalidConfig {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
