//! Per-column type history.
//!
//! Entries are only ever appended. An entry whose `(version, data_type)`
//! already exists for the column is skipped, so recording the same schema
//! version twice leaves the history unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::Schema;

/// A column's recorded type at one schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEntry {
    pub version: String,
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_of: Option<String>,
}

/// Lineage for every recipe, keyed by recipe then column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaLineage {
    history: BTreeMap<String, BTreeMap<String, Vec<LineageEntry>>>,
}

impl SchemaLineage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every column of `schema` at `version`. Returns the number of
    /// entries appended.
    pub fn record(&mut self, recipe: &str, version: &str, schema: &Schema) -> usize {
        let columns = self.history.entry(recipe.to_string()).or_default();
        let mut appended = 0;
        for col in &schema.columns {
            let entries = columns.entry(col.name.clone()).or_default();
            let seen = entries
                .iter()
                .any(|e| e.version == version && e.data_type == col.data_type);
            if seen {
                continue;
            }
            entries.push(LineageEntry {
                version: version.to_string(),
                data_type: col.data_type.clone(),
                variant_of: col.variant_of.clone(),
            });
            appended += 1;
        }
        debug!(
            "Lineage for {}@{}: {} new entries",
            recipe, version, appended
        );
        appended
    }

    /// Ordered history of one column; empty when nothing was recorded.
    pub fn get(&self, recipe: &str, column: &str) -> &[LineageEntry] {
        self.history
            .get(recipe)
            .and_then(|columns| columns.get(column))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn recipes(&self) -> Vec<&str> {
        self.history.keys().map(String::as_str).collect()
    }

    pub fn columns(&self, recipe: &str) -> Vec<&str> {
        self.history
            .get(recipe)
            .map(|columns| columns.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Forget everything recorded for `recipe`.
    pub(crate) fn clear_recipe(&mut self, recipe: &str) {
        self.history.remove(recipe);
    }
}
