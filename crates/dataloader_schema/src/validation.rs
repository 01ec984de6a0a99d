//! Batch validation against a registered schema.
//!
//! Three independent passes, all issues collected before returning:
//!
//! 1. **Extra columns** (in the batch, not in the schema)
//! 2. **Missing columns** (in the schema, not in the batch)
//! 3. **Type mismatches** on shared columns, compared after normalization
//!
//! Issues are data, never errors. The caller decides whether a non-empty
//! `errors` list aborts the batch. Validation never creates variant columns;
//! that is [`crate::SchemaEvolution`]'s job.

use std::collections::HashSet;
use std::fmt;

use arrow::array::BooleanArray;
use arrow::compute::{filter_record_batch, is_not_null, not, or};
use arrow::datatypes::Schema as ArrowSchema;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::contracts::{ContractMode, SchemaContracts};
use crate::model::{Column, Schema, SchemaMode};
use crate::types::{arrow_to_canonical, normalize_type};

/// Severity of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Error,
    Warning,
}

/// A single finding from [`SchemaValidator::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    pub message: String,
    pub column: Option<String>,
}

impl ValidationIssue {
    pub fn error(message: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            message: message.into(),
            column: Some(column.into()),
        }
    }

    pub fn warning(message: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            message: message.into(),
            column: Some(column.into()),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            IssueLevel::Error => "error",
            IssueLevel::Warning => "warning",
        };
        write!(f, "{}: {}", level, self.message)
    }
}

/// Outcome of validating one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    /// Columns removed from the batch and kept out of the validated schema
    pub dropped_columns: Vec<String>,
    /// Rows holding a non-null value in any of these columns are discarded
    pub discard_rows_on: Vec<String>,
    /// The schema plus any columns added in `infer` mode
    pub validated_schema: Schema,
}

impl ValidationResult {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors first, then warnings.
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().chain(self.warnings.iter())
    }

    /// Apply row and column discards to the batch this result was computed for.
    pub fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, ArrowError> {
        let mut offending: Option<BooleanArray> = None;
        for name in &self.discard_rows_on {
            let Some(array) = batch.column_by_name(name) else {
                continue;
            };
            let present = is_not_null(array.as_ref())?;
            offending = Some(match offending {
                Some(acc) => or(&acc, &present)?,
                None => present,
            });
        }

        let filtered = match offending {
            Some(mask) => {
                let kept = filter_record_batch(batch, &not(&mask)?)?;
                let discarded = batch.num_rows() - kept.num_rows();
                if discarded > 0 {
                    warn!("Discarded {} of {} rows", discarded, batch.num_rows());
                }
                kept
            }
            None => batch.clone(),
        };

        if self.dropped_columns.is_empty() {
            return Ok(filtered);
        }
        let dropped: HashSet<&str> = self.dropped_columns.iter().map(String::as_str).collect();
        let keep: Vec<usize> = filtered
            .schema()
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, field)| !dropped.contains(field.name().as_str()))
            .map(|(idx, _)| idx)
            .collect();
        filtered.project(&keep)
    }
}

/// Reconciles batches against a schema under a mode and contracts.
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    mode: SchemaMode,
    contracts: SchemaContracts,
    table: Option<String>,
}

impl SchemaValidator {
    pub fn new(mode: SchemaMode, contracts: SchemaContracts) -> Self {
        Self {
            mode,
            contracts,
            table: None,
        }
    }

    /// Bind to a table so its contract override applies.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn mode(&self) -> SchemaMode {
        self.mode
    }

    pub fn contracts(&self) -> &SchemaContracts {
        &self.contracts
    }

    pub fn validate(&self, batch: &RecordBatch, schema: &Schema) -> ValidationResult {
        self.validate_fields(&batch.schema(), schema)
    }

    /// Validate a batch's field set against `schema`.
    pub fn validate_fields(&self, fields: &ArrowSchema, schema: &Schema) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut dropped = Vec::new();
        let mut discard_rows_on = Vec::new();
        let mut columns = schema.columns.clone();
        let table = self.table.as_deref();

        // Extra columns in data; a repeated field name is reported once
        let mut seen = HashSet::new();
        for field in fields.fields() {
            let name = field.name();
            if !seen.insert(name.as_str()) {
                warnings.push(ValidationIssue::warning(
                    format!("duplicate column '{}' in batch", name),
                    name,
                ));
                continue;
            }
            if schema.contains(name) {
                continue;
            }
            let data_type = arrow_to_canonical(field.data_type());
            match self.contracts.resolve(table, name, Some(&data_type)) {
                ContractMode::DiscardColumns => {
                    dropped.push(name.clone());
                    warnings.push(ValidationIssue::warning(
                        format!("dropped column '{}'", name),
                        name,
                    ));
                }
                ContractMode::DiscardRows => {
                    dropped.push(name.clone());
                    discard_rows_on.push(name.clone());
                    warnings.push(ValidationIssue::warning(
                        format!("discarding rows with values in unexpected column '{}'", name),
                        name,
                    ));
                }
                ContractMode::Freeze => {
                    errors.push(ValidationIssue::error(
                        format!("unexpected column '{}'", name),
                        name,
                    ));
                }
                ContractMode::Evolve => match self.mode {
                    SchemaMode::Strict => {
                        errors.push(ValidationIssue::error(
                            format!("unexpected column '{}'", name),
                            name,
                        ));
                    }
                    SchemaMode::Infer => {
                        columns.push(
                            Column::new(name, data_type)
                                .with_nullable(field.is_nullable())
                                .with_metadata("source_path", Value::from(name.as_str()))
                                .with_metadata("inferred", Value::Bool(true)),
                        );
                        warnings.push(ValidationIssue::warning(
                            format!("added column '{}' to schema", name),
                            name,
                        ));
                    }
                    SchemaMode::Lenient => {
                        warnings.push(ValidationIssue::warning(
                            format!("extra column '{}'", name),
                            name,
                        ));
                    }
                },
            }
        }

        // Missing columns expected by schema
        for col in &schema.columns {
            if fields.field_with_name(&col.name).is_ok() {
                continue;
            }
            let contract = self.contracts.resolve(table, &col.name, Some(&col.data_type));
            let issue_message = format!("missing column '{}'", col.name);
            if contract == ContractMode::Freeze || self.mode == SchemaMode::Strict {
                errors.push(ValidationIssue::error(issue_message, &col.name));
            } else {
                warnings.push(ValidationIssue::warning(issue_message, &col.name));
            }
        }

        // Type mismatches on shared columns
        let mut checked = HashSet::new();
        for field in fields.fields() {
            let name = field.name();
            if !checked.insert(name.as_str()) {
                continue;
            }
            let Some(col) = schema.column(name) else {
                continue;
            };
            let expected = normalize_type(&col.data_type);
            let actual = normalize_type(&arrow_to_canonical(field.data_type()));
            if expected == actual {
                continue;
            }
            let message = format!(
                "type mismatch for '{}': expected {}, got {}",
                name, expected, actual
            );
            match self.contracts.resolve(table, name, Some(&actual)) {
                ContractMode::Freeze => errors.push(ValidationIssue::error(message, name)),
                ContractMode::DiscardRows => {
                    discard_rows_on.push(name.clone());
                    warnings.push(ValidationIssue::warning(
                        format!("{}; discarding rows with values", message),
                        name,
                    ));
                }
                _ if self.mode == SchemaMode::Strict => {
                    errors.push(ValidationIssue::error(message, name));
                }
                _ => warnings.push(ValidationIssue::warning(message, name)),
            }
        }

        for issue in &warnings {
            warn!("Schema validation {}", issue);
        }
        debug!(
            "Validated {} fields against {} columns: {} errors, {} warnings, {} dropped",
            fields.fields().len(),
            schema.columns.len(),
            errors.len(),
            warnings.len(),
            dropped.len()
        );

        ValidationResult {
            errors,
            warnings,
            dropped_columns: dropped,
            discard_rows_on,
            validated_schema: schema.with_columns(columns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array, StringArray};
    use std::sync::Arc;

    fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
        RecordBatch::try_from_iter(columns).unwrap()
    }

    fn ints(values: Vec<Option<i64>>) -> ArrayRef {
        Arc::new(Int64Array::from(values))
    }

    fn strings(values: Vec<Option<&str>>) -> ArrayRef {
        Arc::new(StringArray::from(values))
    }

    #[test]
    fn test_strict_missing_column_is_single_error() {
        let schema = Schema::new(vec![
            Column::new("id", "int"),
            Column::new("name", "string"),
            Column::new("age", "int"),
        ])
        .with_mode(SchemaMode::Strict);
        let data = batch(vec![
            ("id", ints(vec![Some(1)])),
            ("name", strings(vec![Some("ada")])),
        ]);

        let result = SchemaValidator::new(SchemaMode::Strict, SchemaContracts::default())
            .validate(&data, &schema);

        assert!(!result.ok());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "missing column 'age'");
        assert_eq!(result.errors[0].column.as_deref(), Some("age"));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_infer_mode_adds_extra_column() {
        let schema = Schema::new(vec![Column::new("a", "int64")]);
        let data = batch(vec![
            ("a", ints(vec![Some(1)])),
            ("extra_field", strings(vec![Some("x")])),
        ]);

        let result = SchemaValidator::new(SchemaMode::Infer, SchemaContracts::default())
            .validate(&data, &schema);

        assert!(result.ok());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].level, IssueLevel::Warning);
        let added = result.validated_schema.column("extra_field").unwrap();
        assert_eq!(added.data_type, "string");
        assert_eq!(added.metadata["inferred"], true);
    }

    #[test]
    fn test_duplicate_batch_fields_add_one_column() {
        use arrow::datatypes::{DataType, Field};

        let fields = ArrowSchema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("x", DataType::Int64, true),
            Field::new("x", DataType::Utf8, true),
        ]);
        let schema = Schema::new(vec![Column::new("a", "int")]);

        let result = SchemaValidator::new(SchemaMode::Infer, SchemaContracts::default())
            .validate_fields(&fields, &schema);

        assert!(result.ok());
        assert_eq!(result.validated_schema.column_names(), vec!["a", "x"]);
        assert_eq!(result.validated_schema.column("x").unwrap().data_type, "int");
        let messages: Vec<&str> = result.warnings.iter().map(|w| w.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["added column 'x' to schema", "duplicate column 'x' in batch"]
        );
    }

    #[test]
    fn test_duplicate_shared_field_checked_once() {
        use arrow::datatypes::{DataType, Field};

        let fields = ArrowSchema::new(vec![
            Field::new("a", DataType::Utf8, true),
            Field::new("a", DataType::Utf8, true),
        ]);
        let schema = Schema::new(vec![Column::new("a", "int")]);

        let result = SchemaValidator::new(SchemaMode::Strict, SchemaContracts::default())
            .validate_fields(&fields, &schema);

        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0].message,
            "type mismatch for 'a': expected int, got string"
        );
    }

    #[test]
    fn test_strict_extra_column_errors() {
        let schema = Schema::new(vec![Column::new("a", "int64")]);
        let data = batch(vec![("a", ints(vec![Some(1)])), ("b", ints(vec![Some(2)]))]);

        let result = SchemaValidator::new(SchemaMode::Strict, SchemaContracts::default())
            .validate(&data, &schema);

        assert!(!result.ok());
        assert!(result
            .errors
            .iter()
            .any(|issue| issue.message.contains("unexpected column 'b'")));
        assert!(!result.validated_schema.contains("b"));
    }

    #[test]
    fn test_lenient_extra_column_warns_only() {
        let schema = Schema::new(vec![Column::new("a", "int")]);
        let data = batch(vec![("a", ints(vec![Some(1)])), ("b", ints(vec![Some(2)]))]);

        let result = SchemaValidator::new(SchemaMode::Lenient, SchemaContracts::default())
            .validate(&data, &schema);

        assert!(result.ok());
        assert_eq!(result.warnings[0].message, "extra column 'b'");
        assert!(!result.validated_schema.contains("b"));
        assert!(result.dropped_columns.is_empty());
    }

    #[test]
    fn test_discard_columns_contract_drops_extra() {
        let schema = Schema::new(vec![Column::new("a", "int64")]);
        let data = batch(vec![("a", ints(vec![Some(1)])), ("b", ints(vec![Some(2)]))]);
        let contracts = SchemaContracts::default().with_column("b", ContractMode::DiscardColumns);

        let result = SchemaValidator::new(SchemaMode::Strict, contracts).validate(&data, &schema);

        assert!(result.ok());
        assert_eq!(result.dropped_columns, vec!["b"]);
        let cleaned = result.apply(&data).unwrap();
        assert_eq!(cleaned.num_columns(), 1);
        assert_eq!(cleaned.schema().field(0).name(), "a");
        assert_eq!(cleaned.num_rows(), 1);
    }

    #[test]
    fn test_freeze_type_mismatch_errors_even_in_infer_mode() {
        let schema = Schema::new(vec![Column::new("a", "int64")]);
        let data = batch(vec![("a", strings(vec![Some("x")]))]);
        let contracts = SchemaContracts::default().with_column("a", ContractMode::Freeze);

        let result = SchemaValidator::new(SchemaMode::Infer, contracts).validate(&data, &schema);

        assert!(!result.ok());
        assert_eq!(
            result.errors[0].message,
            "type mismatch for 'a': expected int, got string"
        );
        assert_eq!(result.validated_schema.len(), 1);
    }

    #[test]
    fn test_type_mismatch_warns_outside_strict() {
        let schema = Schema::new(vec![Column::new("a", "int")]);
        let data = batch(vec![("a", strings(vec![Some("x")]))]);

        let lenient = SchemaValidator::new(SchemaMode::Lenient, SchemaContracts::default())
            .validate(&data, &schema);
        assert!(lenient.ok());
        assert_eq!(lenient.warnings.len(), 1);
        assert!(!lenient.validated_schema.contains("a__v_string"));

        let strict = SchemaValidator::new(SchemaMode::Strict, SchemaContracts::default())
            .validate(&data, &schema);
        assert_eq!(strict.errors.len(), 1);
    }

    #[test]
    fn test_type_aliases_are_not_mismatches() {
        let schema = Schema::new(vec![Column::new("a", "bigint"), Column::new("b", "str")]);
        let data = batch(vec![("a", ints(vec![Some(1)])), ("b", strings(vec![Some("x")]))]);

        let result = SchemaValidator::new(SchemaMode::Strict, SchemaContracts::default())
            .validate(&data, &schema);
        assert!(result.ok());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_freeze_missing_column_errors_in_lenient_mode() {
        let schema = Schema::new(vec![Column::new("a", "int"), Column::new("b", "int")]);
        let data = batch(vec![("a", ints(vec![Some(1)]))]);
        let contracts = SchemaContracts::default().with_column("b", ContractMode::Freeze);

        let result = SchemaValidator::new(SchemaMode::Lenient, contracts).validate(&data, &schema);
        assert_eq!(result.errors.len(), 1);

        let relaxed = SchemaValidator::new(SchemaMode::Lenient, SchemaContracts::default())
            .validate(&data, &schema);
        assert!(relaxed.ok());
        assert_eq!(relaxed.warnings[0].message, "missing column 'b'");
    }

    #[test]
    fn test_discard_rows_on_extra_column_filters_rows() {
        let schema = Schema::new(vec![Column::new("a", "int")]);
        let data = batch(vec![
            ("a", ints(vec![Some(1), Some(2), Some(3)])),
            ("extra", ints(vec![None, Some(9), None])),
        ]);
        let contracts = SchemaContracts::default().with_column("extra", ContractMode::DiscardRows);

        let result = SchemaValidator::new(SchemaMode::Strict, contracts).validate(&data, &schema);
        assert!(result.ok());
        assert_eq!(result.discard_rows_on, vec!["extra"]);

        let cleaned = result.apply(&data).unwrap();
        assert_eq!(cleaned.num_rows(), 2);
        assert_eq!(cleaned.num_columns(), 1);
        let kept = cleaned
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(kept.values().to_vec(), vec![1, 3]);
    }

    #[test]
    fn test_discard_rows_on_type_mismatch_keeps_column() {
        let schema = Schema::new(vec![Column::new("id", "int"), Column::new("code", "int")]);
        let data = batch(vec![
            ("id", ints(vec![Some(1), Some(2)])),
            ("code", strings(vec![Some("A1"), None])),
        ]);
        let contracts = SchemaContracts::default().with_data_type("string", ContractMode::DiscardRows);

        let result = SchemaValidator::new(SchemaMode::Strict, contracts).validate(&data, &schema);
        assert!(result.ok());
        assert!(result.dropped_columns.is_empty());

        let cleaned = result.apply(&data).unwrap();
        assert_eq!(cleaned.num_rows(), 1);
        assert_eq!(cleaned.num_columns(), 2);
    }

    #[test]
    fn test_table_contract_applies_when_bound() {
        let schema = Schema::new(vec![Column::new("a", "int")]);
        let data = batch(vec![("a", ints(vec![Some(1)])), ("b", ints(vec![Some(2)]))]);
        let contracts = SchemaContracts::default().with_table("events", ContractMode::Freeze);

        let unbound = SchemaValidator::new(SchemaMode::Infer, contracts.clone())
            .validate(&data, &schema);
        assert!(unbound.ok());

        let bound = SchemaValidator::new(SchemaMode::Infer, contracts)
            .with_table("events")
            .validate(&data, &schema);
        assert!(!bound.ok());
    }

    #[test]
    fn test_passes_do_not_short_circuit() {
        let schema = Schema::new(vec![Column::new("a", "int"), Column::new("gone", "int")]);
        let data = batch(vec![
            ("a", strings(vec![Some("x")])),
            ("new", ints(vec![Some(1)])),
        ]);

        let result = SchemaValidator::new(SchemaMode::Strict, SchemaContracts::default())
            .validate(&data, &schema);
        assert_eq!(result.errors.len(), 3);
        assert_eq!(result.issues().count(), 3);
    }
}
