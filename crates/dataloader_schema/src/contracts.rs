//! Schema contracts: which policy governs a deviation.
//!
//! Resolution order for a column is column override, then data type override,
//! then (when the validator is bound to a table) the table override, then the
//! default.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::types::normalize_type;

/// How a schema deviation is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContractMode {
    /// Accept the deviation and let the schema evolve
    #[default]
    Evolve,
    /// Reject the deviation
    Freeze,
    /// Drop the rows carrying the deviating values
    DiscardRows,
    /// Drop the deviating column
    DiscardColumns,
}

impl ContractMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractMode::Evolve => "evolve",
            ContractMode::Freeze => "freeze",
            ContractMode::DiscardRows => "discard_rows",
            ContractMode::DiscardColumns => "discard_columns",
        }
    }
}

impl fmt::Display for ContractMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContractMode {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "evolve" => Ok(ContractMode::Evolve),
            "freeze" => Ok(ContractMode::Freeze),
            "discard_rows" => Ok(ContractMode::DiscardRows),
            "discard_columns" => Ok(ContractMode::DiscardColumns),
            _ => Err(SchemaError::InvalidContractMode(s.to_string())),
        }
    }
}

/// Default contract mode plus overrides keyed by table, column and data type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SchemaContracts {
    pub default: ContractMode,
    pub tables: BTreeMap<String, ContractMode>,
    pub columns: BTreeMap<String, ContractMode>,
    pub data_types: BTreeMap<String, ContractMode>,
}

impl SchemaContracts {
    pub fn new(default: ContractMode) -> Self {
        Self {
            default,
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table: impl Into<String>, mode: ContractMode) -> Self {
        self.tables.insert(table.into(), mode);
        self
    }

    pub fn with_column(mut self, column: impl Into<String>, mode: ContractMode) -> Self {
        self.columns.insert(column.into(), mode);
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>, mode: ContractMode) -> Self {
        self.data_types.insert(data_type.into(), mode);
        self
    }

    pub fn table_mode(&self, table: &str) -> ContractMode {
        self.tables.get(table).copied().unwrap_or(self.default)
    }

    /// Column override, else data type override, else default.
    pub fn column_mode(&self, column: &str, data_type: Option<&str>) -> ContractMode {
        self.resolve(None, column, data_type)
    }

    pub fn data_type_mode(&self, data_type: &str) -> ContractMode {
        self.data_type_override(data_type).unwrap_or(self.default)
    }

    /// Exact key first, then any key naming the same type under another spelling.
    fn data_type_override(&self, data_type: &str) -> Option<ContractMode> {
        if let Some(mode) = self.data_types.get(data_type) {
            return Some(*mode);
        }
        let wanted = normalize_type(data_type);
        self.data_types
            .iter()
            .find(|(key, _)| normalize_type(key) == wanted)
            .map(|(_, mode)| *mode)
    }

    /// Column, then data type, then table, then default.
    pub fn resolve(
        &self,
        table: Option<&str>,
        column: &str,
        data_type: Option<&str>,
    ) -> ContractMode {
        if let Some(mode) = self.columns.get(column) {
            return *mode;
        }
        if let Some(mode) = data_type.and_then(|dt| self.data_type_override(dt)) {
            return mode;
        }
        if let Some(mode) = table.and_then(|t| self.tables.get(t)) {
            return *mode;
        }
        self.default
    }
}
