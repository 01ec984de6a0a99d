//! The `schema:` block of a recipe.
//!
//! Parsing is strict: unknown keys, unknown enum values, and unknown type
//! names are rejected before any batch is processed.
//!
//! ```yaml
//! schema:
//!   mode: strict
//!   reflection_level: deep
//!   sample_size: 1000
//!   contracts:
//!     default: evolve
//!     columns: { notes: discard_columns }
//!     data_types: { string: freeze }
//!   columns:
//!     - { name: id, type: int, nullable: false, primary_key: true }
//!   evolution: { allow_new_columns: true }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::contracts::SchemaContracts;
use crate::error::SchemaError;
use crate::inference::{ReflectionLevel, TypeInferrer};
use crate::model::{Column, EvolutionPolicy, Metadata, Schema, SchemaMode};
use crate::types::{canonical_to_arrow, is_known_type, normalize_type};
use crate::validation::SchemaValidator;
use crate::version::VersionId;

/// An explicitly declared column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_true() -> bool {
    true
}

impl ColumnConfig {
    pub fn to_column(&self) -> Column {
        let mut column = Column::new(&self.name, &self.data_type)
            .with_nullable(self.nullable)
            .with_primary_key(self.primary_key)
            .with_unique(self.unique);
        column.metadata = self.metadata.clone();
        column
    }
}

/// Schema settings for one recipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SchemaConfig {
    pub mode: SchemaMode,
    pub reflection_level: ReflectionLevel,
    /// Rows inference may look at per batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<usize>,
    pub contracts: SchemaContracts,
    pub columns: Vec<ColumnConfig>,
    pub evolution: EvolutionPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub metadata: Metadata,
}

impl SchemaConfig {
    pub fn from_yaml_str(input: &str) -> Result<Self, SchemaError> {
        let config: SchemaConfig = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(input: &str) -> Result<Self, SchemaError> {
        let config: SchemaConfig = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configuration no input could satisfy.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.name.trim().is_empty() {
                return Err(SchemaError::EmptyColumnName);
            }
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
            canonical_to_arrow(&column.data_type)?;
        }

        // Aliases such as int64 are accepted here; they match by normalized type.
        for key in self.contracts.data_types.keys() {
            if !is_known_type(&normalize_type(key)) {
                return Err(SchemaError::UnknownType(key.clone()));
            }
        }

        if self.sample_size == Some(0) {
            return Err(SchemaError::invalid_config("sample_size must be at least 1"));
        }

        if let Some(version) = &self.version {
            VersionId::parse(version).map_err(|e| SchemaError::invalid_config(e.to_string()))?;
        }
        Ok(())
    }

    pub fn to_schema(&self) -> Schema {
        let mut schema = Schema::new(self.columns.iter().map(ColumnConfig::to_column).collect())
            .with_mode(self.mode)
            .with_evolution(self.evolution);
        schema.version = self.version.clone();
        schema.metadata = self.metadata.clone();
        schema
    }

    pub fn contracts(&self) -> SchemaContracts {
        self.contracts.clone()
    }

    pub fn inferrer(&self) -> TypeInferrer {
        let inferrer = TypeInferrer::new(self.reflection_level);
        match self.sample_size {
            Some(cap) => inferrer.with_sample_size(cap),
            None => inferrer,
        }
    }

    /// A validator in this config's mode, bound to `table` when given.
    pub fn validator(&self, table: Option<&str>) -> SchemaValidator {
        let validator = SchemaValidator::new(self.mode, self.contracts());
        match table {
            Some(table) => validator.with_table(table),
            None => validator,
        }
    }

    pub fn version_id(&self) -> Option<VersionId> {
        self.version.as_deref().and_then(|v| VersionId::parse(v).ok())
    }
}
