//! Schema inference from Arrow batches.
//!
//! Shallow levels (`none`, `shallow`, `one`) map each top-level field to one
//! column, rendering nested types as opaque composites. Deep levels (`deep`,
//! `full`) flatten structs depth-first into `parent__child` columns and
//! list-of-struct into `parent__item__child`. Lists of scalars stay one
//! opaque `list<T>` column.
//!
//! Inference never fails: unsupported native types become `string`, and when
//! two fields flatten to the same name the first one wins.
//!
//! Each column's `source_path` metadata is the dotted path of the field it
//! came from (`address.geo.lat`, `orders.item.sku`), which stays unambiguous
//! even when a field name itself contains `__`.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use arrow::datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SchemaError;
use crate::model::{Column, Schema};
use crate::types::arrow_to_canonical;

/// Separator between a parent name and its flattened child.
pub const FLATTEN_SEPARATOR: &str = "__";

/// Path segment used for the element of a list.
pub const LIST_ITEM_SEGMENT: &str = "item";

/// How deeply nested structures are flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionLevel {
    None,
    Shallow,
    One,
    #[default]
    Deep,
    Full,
}

impl ReflectionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflectionLevel::None => "none",
            ReflectionLevel::Shallow => "shallow",
            ReflectionLevel::One => "one",
            ReflectionLevel::Deep => "deep",
            ReflectionLevel::Full => "full",
        }
    }

    /// Returns true if nested fields are flattened into separate columns.
    pub fn flattens(&self) -> bool {
        matches!(self, ReflectionLevel::Deep | ReflectionLevel::Full)
    }
}

impl fmt::Display for ReflectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReflectionLevel {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(ReflectionLevel::None),
            "shallow" => Ok(ReflectionLevel::Shallow),
            "one" => Ok(ReflectionLevel::One),
            "deep" => Ok(ReflectionLevel::Deep),
            "full" => Ok(ReflectionLevel::Full),
            _ => Err(SchemaError::InvalidReflectionLevel(s.to_string())),
        }
    }
}

/// Outcome of one inference call.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    pub schema: Schema,
    pub reflection_level: ReflectionLevel,
    pub sample_size: Option<usize>,
    /// Rows actually considered after applying `sample_size`
    pub rows_sampled: usize,
}

/// Derives a candidate [`Schema`] from a batch.
#[derive(Debug, Clone, Default)]
pub struct TypeInferrer {
    reflection_level: ReflectionLevel,
    sample_size: Option<usize>,
}

impl TypeInferrer {
    pub fn new(reflection_level: ReflectionLevel) -> Self {
        Self {
            reflection_level,
            sample_size: None,
        }
    }

    /// Cap the number of rows inference may look at.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = Some(sample_size);
        self
    }

    pub fn reflection_level(&self) -> ReflectionLevel {
        self.reflection_level
    }

    pub fn sample_size(&self) -> Option<usize> {
        self.sample_size
    }

    /// Infer a schema from a batch, truncated to the sample size first.
    pub fn infer(&self, batch: &RecordBatch) -> InferenceResult {
        let sampled = match self.sample_size {
            Some(cap) if batch.num_rows() > cap => batch.slice(0, cap),
            _ => batch.clone(),
        };
        let mut result = self.infer_schema(&sampled.schema());
        result.rows_sampled = sampled.num_rows();
        result
    }

    /// Infer from field definitions alone (no rows).
    pub fn infer_schema(&self, arrow_schema: &ArrowSchema) -> InferenceResult {
        let mut columns = Vec::new();
        for field in arrow_schema.fields() {
            if self.reflection_level.flattens() {
                flatten_field(field.name(), field.name(), field, false, &mut columns);
            } else {
                let data_type = arrow_to_canonical(field.data_type());
                columns.push(inferred_column(
                    field.name(),
                    field.name(),
                    data_type,
                    field.is_nullable(),
                ));
            }
        }

        let columns = first_occurrences(columns);

        debug!(
            "Inferred {} columns from {} fields (reflection level: {})",
            columns.len(),
            arrow_schema.fields().len(),
            self.reflection_level
        );

        InferenceResult {
            schema: Schema::new(columns),
            reflection_level: self.reflection_level,
            sample_size: self.sample_size,
            rows_sampled: 0,
        }
    }
}

/// Depth-first flattening of one field into `out`, in field order.
fn flatten_field(
    name: &str,
    source_path: &str,
    field: &Field,
    parent_nullable: bool,
    out: &mut Vec<Column>,
) {
    let nullable = parent_nullable || field.is_nullable();
    match field.data_type() {
        ArrowDataType::Struct(children) if !children.is_empty() => {
            for child in children {
                flatten_field(
                    &join_name(name, child.name()),
                    &join_path(source_path, child.name()),
                    child,
                    nullable,
                    out,
                );
            }
        }
        ArrowDataType::List(item)
        | ArrowDataType::LargeList(item)
        | ArrowDataType::FixedSizeList(item, _) => match item.data_type() {
            ArrowDataType::Struct(children) if !children.is_empty() => {
                let item_name = join_name(name, LIST_ITEM_SEGMENT);
                let item_path = join_path(source_path, LIST_ITEM_SEGMENT);
                let item_nullable = nullable || item.is_nullable();
                for child in children {
                    flatten_field(
                        &join_name(&item_name, child.name()),
                        &join_path(&item_path, child.name()),
                        child,
                        item_nullable,
                        out,
                    );
                }
            }
            _ => out.push(inferred_column(
                name,
                source_path,
                arrow_to_canonical(field.data_type()),
                nullable,
            )),
        },
        other => out.push(inferred_column(
            name,
            source_path,
            arrow_to_canonical(other),
            nullable,
        )),
    }
}

/// Keep the first column of each name. A top-level `a__b` and a flattened
/// `a { b }` collide; so do duplicate Arrow field names.
fn first_occurrences(columns: Vec<Column>) -> Vec<Column> {
    let mut seen = HashSet::new();
    columns
        .into_iter()
        .filter(|col| {
            let first = seen.insert(col.name.clone());
            if !first {
                warn!(
                    "Skipping column '{}' from '{}': name already inferred",
                    col.name,
                    col.metadata
                        .get("source_path")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or(col.name.as_str())
                );
            }
            first
        })
        .collect()
}

fn inferred_column(name: &str, source_path: &str, data_type: String, nullable: bool) -> Column {
    Column::new(name, data_type)
        .with_nullable(nullable)
        .with_metadata("source_path", Value::from(source_path))
        .with_metadata("inferred", Value::Bool(true))
}

fn join_name(parent: &str, child: &str) -> String {
    format!("{}{}{}", parent, FLATTEN_SEPARATOR, child)
}

fn join_path(parent: &str, child: &str) -> String {
    format!("{}.{}", parent, child)
}
