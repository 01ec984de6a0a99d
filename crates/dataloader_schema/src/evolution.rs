//! Additive schema evolution.
//!
//! [`SchemaEvolution::apply`] merges an incoming schema into the current one:
//!
//! 1. **New column**: appended, reported in `added_columns`
//! 2. **Type change**: the base column keeps its recorded type; a variant column
//!    `base__v_<type>` is appended instead, reported in `variant_columns` and
//!    `type_changes`
//! 3. **Missing column**: reported in `removed_columns`, never deleted
//!
//! Re-applying the same pair finds the variant already present, so the second
//! application reports no changes.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::model::{Column, EvolutionPolicy, Schema};
use crate::types::normalize_type;

/// Default variant suffix; `{type}` is replaced by the sanitized type.
pub const DEFAULT_VARIANT_SUFFIX: &str = "__v_{type}";

/// Diff produced by [`SchemaEvolution::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaUpdate {
    pub added_columns: Vec<String>,
    pub removed_columns: Vec<String>,
    pub type_changes: Vec<String>,
    pub variant_columns: Vec<String>,
}

impl SchemaUpdate {
    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.type_changes.is_empty()
            && self.variant_columns.is_empty()
    }

    /// True if applying the update changed the column set.
    pub fn changes_schema(&self) -> bool {
        !self.added_columns.is_empty() || !self.variant_columns.is_empty()
    }
}

impl fmt::Display for SchemaUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no changes");
        }
        let mut parts = Vec::new();
        if !self.added_columns.is_empty() {
            parts.push(format!("added: {}", self.added_columns.join(", ")));
        }
        if !self.removed_columns.is_empty() {
            parts.push(format!("removed: {}", self.removed_columns.join(", ")));
        }
        if !self.type_changes.is_empty() {
            parts.push(format!("type changes: {}", self.type_changes.join(", ")));
        }
        if !self.variant_columns.is_empty() {
            parts.push(format!("variants: {}", self.variant_columns.join(", ")));
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// A change the advisory [`EvolutionPolicy`] flags do not allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    NewColumns(Vec<String>),
    ColumnDeletion(Vec<String>),
    TypeChanges(Vec<String>),
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyViolation::NewColumns(cols) => {
                write!(f, "New columns not allowed: {}", cols.join(", "))
            }
            PolicyViolation::ColumnDeletion(cols) => {
                write!(f, "Column deletion not allowed: {}", cols.join(", "))
            }
            PolicyViolation::TypeChanges(cols) => {
                write!(f, "Type changes not allowed: {}", cols.join(", "))
            }
        }
    }
}

impl EvolutionPolicy {
    /// Report the parts of `update` these flags disallow.
    pub fn check(&self, update: &SchemaUpdate) -> Vec<PolicyViolation> {
        let mut violations = Vec::new();
        if !self.allow_new_columns && !update.added_columns.is_empty() {
            violations.push(PolicyViolation::NewColumns(update.added_columns.clone()));
        }
        if !self.allow_column_deletion && !update.removed_columns.is_empty() {
            violations.push(PolicyViolation::ColumnDeletion(update.removed_columns.clone()));
        }
        if !self.allow_type_changes && !update.type_changes.is_empty() {
            violations.push(PolicyViolation::TypeChanges(update.type_changes.clone()));
        }
        violations
    }
}

/// Computes additive schema updates.
#[derive(Debug, Clone)]
pub struct SchemaEvolution {
    variant_suffix: String,
}

impl Default for SchemaEvolution {
    fn default() -> Self {
        Self {
            variant_suffix: DEFAULT_VARIANT_SUFFIX.to_string(),
        }
    }
}

impl SchemaEvolution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom variant suffix. `{type}` is replaced by the sanitized type.
    pub fn with_variant_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.variant_suffix = suffix.into();
        self
    }

    /// Name of the variant column holding `type_name` values for `base`.
    ///
    /// The type is normalized first, so every spelling of one type names the
    /// same variant.
    pub fn variant_name(&self, base: &str, type_name: &str) -> String {
        let type_name = normalize_type(type_name);
        format!(
            "{}{}",
            base,
            self.variant_suffix.replace("{type}", &sanitize_type(&type_name))
        )
    }

    /// Merge `incoming` into `current`, returning the new schema and the diff.
    pub fn apply(&self, current: &Schema, incoming: &Schema) -> (Schema, SchemaUpdate) {
        let mut update = SchemaUpdate::default();
        let mut known: HashSet<String> = current.columns.iter().map(|c| c.name.clone()).collect();
        let mut columns = current.columns.clone();

        for col in &incoming.columns {
            let Some(existing) = current.column(&col.name) else {
                if known.insert(col.name.clone()) {
                    debug!("Adding column '{}' ({})", col.name, col.data_type);
                    columns.push(col.clone());
                    update.added_columns.push(col.name.clone());
                }
                continue;
            };

            if normalize_type(&existing.data_type) == normalize_type(&col.data_type) {
                continue;
            }

            let variant_name = self.variant_name(&col.name, &col.data_type);
            if !known.insert(variant_name.clone()) {
                continue;
            }

            debug!(
                "Column '{}' changed type {} -> {}; adding variant '{}'",
                col.name, existing.data_type, col.data_type, variant_name
            );
            columns.push(variant_column(col, &variant_name));
            update.variant_columns.push(variant_name);
            update.type_changes.push(col.name.clone());
        }

        for col in &current.columns {
            if incoming.contains(&col.name) {
                continue;
            }
            let base_present = col
                .variant_of
                .as_deref()
                .map_or(false, |base| incoming.contains(base));
            if !base_present {
                update.removed_columns.push(col.name.clone());
            }
        }

        if !update.is_empty() {
            info!("Schema evolution: {}", update);
        }

        (current.with_columns(columns), update)
    }
}

fn variant_column(incoming: &Column, variant_name: &str) -> Column {
    let mut variant = incoming.clone();
    variant.name = variant_name.to_string();
    variant.primary_key = false;
    variant.unique = false;
    variant.variant_of = Some(incoming.name.clone());
    variant
        .metadata
        .insert("variant_of".to_string(), Value::from(incoming.name.as_str()));
    variant.lineage.insert(
        "data_type".to_string(),
        Value::from(incoming.data_type.as_str()),
    );
    variant
}

/// Make a type string safe for use in a column name.
pub fn sanitize_type(type_name: &str) -> String {
    type_name
        .chars()
        .map(|ch| if matches!(ch, ' ' | '<' | '>') { '_' } else { ch })
        .collect()
}
