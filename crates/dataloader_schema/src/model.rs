//! Schema model types.
//!
//! A [`Schema`] is an immutable value: evolution and validation produce new
//! instances, nothing mutates one in place after construction.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use arrow::datatypes::{Field, Schema as ArrowSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;
use crate::types::{arrow_to_canonical, canonical_to_arrow, CANONICAL_TYPE_METADATA_KEY};

/// Opaque key/value map attached to columns and schemas.
pub type Metadata = BTreeMap<String, Value>;

/// Schema validation and inference mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchemaMode {
    /// Fail on schema mismatches
    Strict,
    /// Warn and keep going
    Lenient,
    /// Add newly seen columns to the schema
    #[default]
    Infer,
}

impl SchemaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaMode::Strict => "strict",
            SchemaMode::Lenient => "lenient",
            SchemaMode::Infer => "infer",
        }
    }
}

impl fmt::Display for SchemaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SchemaMode {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(SchemaMode::Strict),
            "lenient" => Ok(SchemaMode::Lenient),
            "infer" => Ok(SchemaMode::Infer),
            _ => Err(SchemaError::InvalidSchemaMode(s.to_string())),
        }
    }
}

/// Advisory evolution flags. Consulted by callers, not enforced by
/// [`crate::SchemaEvolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EvolutionPolicy {
    pub allow_new_columns: bool,
    pub allow_column_deletion: bool,
    pub allow_type_changes: bool,
}

impl Default for EvolutionPolicy {
    fn default() -> Self {
        Self {
            allow_new_columns: true,
            allow_column_deletion: false,
            allow_type_changes: false,
        }
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within a schema
    pub name: String,

    /// Canonical type string (see [`crate::types`])
    #[serde(rename = "type")]
    pub data_type: String,

    #[serde(default = "default_nullable")]
    pub nullable: bool,

    #[serde(default)]
    pub primary_key: bool,

    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub metadata: Metadata,

    /// Base column name when this is a variant created by a type change.
    /// A lookup key only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_of: Option<String>,

    /// Lineage metadata, seeded with `data_type`
    #[serde(default)]
    pub lineage: Metadata,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    /// Create a nullable column with its lineage seeded from the type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        let mut lineage = Metadata::new();
        lineage.insert("data_type".to_string(), Value::String(data_type.clone()));
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            primary_key: false,
            unique: false,
            metadata: Metadata::new(),
            variant_of: None,
            lineage,
        }
    }

    /// Create a new required (non-nullable) column
    pub fn required(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self::new(name, data_type).with_nullable(false)
    }

    /// Create a new optional (nullable) column
    pub fn optional(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self::new(name, data_type)
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_lineage(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.lineage.insert(key.into(), value.into());
        self
    }

    pub fn with_variant_of(mut self, base: impl Into<String>) -> Self {
        self.variant_of = Some(base.into());
        self
    }

    pub fn is_variant(&self) -> bool {
        self.variant_of.is_some()
    }

    /// Convert to an Arrow field, recording the canonical spelling in field metadata.
    pub fn to_arrow_field(&self) -> Result<Field, SchemaError> {
        let arrow_type = canonical_to_arrow(&self.data_type)?;
        let metadata = HashMap::from([(
            CANONICAL_TYPE_METADATA_KEY.to_string(),
            self.data_type.clone(),
        )]);
        Ok(Field::new(&self.name, arrow_type, self.nullable).with_metadata(metadata))
    }

    /// Build a column from an Arrow field.
    ///
    /// A recorded canonical spelling wins as long as it still maps to the
    /// field's Arrow type; otherwise the type is rendered from Arrow.
    pub fn from_arrow_field(field: &Field) -> Self {
        let rendered = arrow_to_canonical(field.data_type());
        let data_type = field
            .metadata()
            .get(CANONICAL_TYPE_METADATA_KEY)
            .filter(|recorded| {
                canonical_to_arrow(recorded)
                    .map(|dt| &dt == field.data_type())
                    .unwrap_or(false)
            })
            .cloned()
            .unwrap_or(rendered);
        Column::new(field.name(), data_type).with_nullable(field.is_nullable())
    }
}

/// Complete schema definition for a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Ordered columns. Order matters for flattening and display only.
    pub columns: Vec<Column>,

    #[serde(default)]
    pub mode: SchemaMode,

    #[serde(default)]
    pub evolution: EvolutionPolicy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub metadata: Metadata,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            mode: SchemaMode::default(),
            evolution: EvolutionPolicy::default(),
            version: None,
            metadata: Metadata::new(),
        }
    }

    /// Build a schema, rejecting empty or duplicate column names.
    pub fn try_new(columns: Vec<Column>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        for col in &columns {
            if col.name.trim().is_empty() {
                return Err(SchemaError::EmptyColumnName);
            }
            if !seen.insert(col.name.as_str()) {
                return Err(SchemaError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self::new(columns))
    }

    pub fn with_mode(mut self, mode: SchemaMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_evolution(mut self, evolution: EvolutionPolicy) -> Self {
        self.evolution = evolution;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns a copy with `columns` replaced and everything else kept.
    pub fn with_columns(&self, columns: Vec<Column>) -> Self {
        Self {
            columns,
            mode: self.mode,
            evolution: self.evolution,
            version: self.version.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Returns a copy without the named columns.
    pub fn without_columns<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let drop: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        self.with_columns(
            self.columns
                .iter()
                .filter(|c| !drop.contains(c.name.as_str()))
                .cloned()
                .collect(),
        )
    }

    /// Compare the column sets, ignoring column order.
    pub fn same_columns(&self, other: &Schema) -> bool {
        if self.columns.len() != other.columns.len() {
            return false;
        }
        self.columns
            .iter()
            .all(|col| other.column(&col.name).map_or(false, |o| o == col))
    }

    /// Convert to an Arrow schema. Fails on an unknown canonical type.
    pub fn to_arrow_schema(&self) -> Result<ArrowSchema, SchemaError> {
        let fields = self
            .columns
            .iter()
            .map(Column::to_arrow_field)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ArrowSchema::new(fields))
    }

    /// Build a schema from an Arrow schema. Never fails.
    pub fn from_arrow_schema(arrow_schema: &ArrowSchema) -> Self {
        Self::new(
            arrow_schema
                .fields()
                .iter()
                .map(|f| Column::from_arrow_field(f))
                .collect(),
        )
    }
}
