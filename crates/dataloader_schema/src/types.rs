//! Canonical type vocabulary and its mapping to Arrow.
//!
//! Column types are recorded as canonical type strings:
//! `str|string`, `int|integer`, `float|double`, `bool|boolean`,
//! `datetime|timestamp`, `date`, plus the composites `list<T>` and
//! `struct<name: T, ...>`.
//!
//! Canonical -> Arrow is fallible: an unknown name is a configuration error.
//! Arrow -> canonical never fails; anything outside the vocabulary falls back
//! to `string` so that inference cannot block ingestion.

use std::sync::Arc;

use arrow::datatypes::{DataType as ArrowDataType, Field, Fields, TimeUnit};

use crate::error::SchemaError;

/// Arrow field metadata key holding a column's own canonical spelling.
pub const CANONICAL_TYPE_METADATA_KEY: &str = "dataloader.canonical_type";

/// Canonical type used when a native type has no mapping.
pub const FALLBACK_TYPE: &str = "string";

/// Canonical scalar names and their Arrow types.
fn scalar_to_arrow(lower: &str) -> Option<ArrowDataType> {
    let dt = match lower {
        "str" | "string" => ArrowDataType::Utf8,
        "int" | "integer" => ArrowDataType::Int64,
        "float" | "double" => ArrowDataType::Float64,
        "bool" | "boolean" => ArrowDataType::Boolean,
        "datetime" | "timestamp" => ArrowDataType::Timestamp(TimeUnit::Microsecond, None),
        "date" => ArrowDataType::Date32,
        _ => return None,
    };
    Some(dt)
}

/// Spellings the validator treats as equal before comparing types.
fn alias_for(lower: &str) -> Option<&'static str> {
    match lower {
        "int64" | "bigint" | "integer" => Some("int"),
        "float64" | "double" => Some("float"),
        "bool" | "boolean" => Some("bool"),
        "timestamp[us]" | "timestamp[ns]" => Some("datetime"),
        _ => None,
    }
}

/// Convert a canonical type string to an Arrow data type.
pub fn canonical_to_arrow(type_name: &str) -> Result<ArrowDataType, SchemaError> {
    let trimmed = type_name.trim();
    if trimmed.is_empty() {
        return Err(SchemaError::UnknownType(type_name.to_string()));
    }

    if let Some(inner) = composite_body(trimmed, "list")? {
        if inner.trim().is_empty() {
            return Err(SchemaError::InvalidTypeExpression {
                expression: type_name.to_string(),
                reason: "list item type is required".to_string(),
            });
        }
        let item = canonical_to_arrow(inner)?;
        return Ok(ArrowDataType::List(Arc::new(Field::new("item", item, true))));
    }

    if let Some(inner) = composite_body(trimmed, "struct")? {
        let mut fields = Vec::new();
        for part in split_top_level(inner) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, child_type) =
                part.split_once(':')
                    .ok_or_else(|| SchemaError::InvalidTypeExpression {
                        expression: type_name.to_string(),
                        reason: format!("struct field '{}' must be written as 'name: type'", part),
                    })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(SchemaError::InvalidTypeExpression {
                    expression: type_name.to_string(),
                    reason: "struct field name is empty".to_string(),
                });
            }
            fields.push(Field::new(name, canonical_to_arrow(child_type)?, true));
        }
        return Ok(ArrowDataType::Struct(Fields::from(fields)));
    }

    scalar_to_arrow(&trimmed.to_lowercase())
        .ok_or_else(|| SchemaError::UnknownType(type_name.to_string()))
}

/// Render an Arrow data type as a canonical type string.
pub fn arrow_to_canonical(data_type: &ArrowDataType) -> String {
    match data_type {
        ArrowDataType::Utf8 | ArrowDataType::LargeUtf8 | ArrowDataType::Utf8View => {
            "string".to_string()
        }
        ArrowDataType::Int8
        | ArrowDataType::Int16
        | ArrowDataType::Int32
        | ArrowDataType::Int64
        | ArrowDataType::UInt8
        | ArrowDataType::UInt16
        | ArrowDataType::UInt32
        | ArrowDataType::UInt64 => "int".to_string(),
        ArrowDataType::Float16 | ArrowDataType::Float32 | ArrowDataType::Float64 => {
            "float".to_string()
        }
        ArrowDataType::Boolean => "bool".to_string(),
        ArrowDataType::Timestamp(_, _) => "datetime".to_string(),
        ArrowDataType::Date32 | ArrowDataType::Date64 => "date".to_string(),
        ArrowDataType::List(item)
        | ArrowDataType::LargeList(item)
        | ArrowDataType::FixedSizeList(item, _) => {
            format!("list<{}>", arrow_to_canonical(item.data_type()))
        }
        ArrowDataType::Struct(fields) => {
            let rendered: Vec<String> = fields
                .iter()
                .map(|f| format!("{}: {}", f.name(), arrow_to_canonical(f.data_type())))
                .collect();
            format!("struct<{}>", rendered.join(", "))
        }
        _ => FALLBACK_TYPE.to_string(),
    }
}

/// Returns true if `type_name` is part of the canonical vocabulary.
pub fn is_known_type(type_name: &str) -> bool {
    canonical_to_arrow(type_name).is_ok()
}

/// Normalize a type string so that spelling differences compare equal.
///
/// Alias table first, then the canonical -> Arrow -> canonical round trip,
/// else the lowercased input.
pub fn normalize_type(type_name: &str) -> String {
    let lowered = type_name.trim().to_lowercase();
    if let Some(alias) = alias_for(&lowered) {
        return alias.to_string();
    }
    match canonical_to_arrow(type_name) {
        Ok(arrow_type) => {
            let canonical = arrow_to_canonical(&arrow_type);
            alias_for(&canonical)
                .map(str::to_string)
                .unwrap_or(canonical)
        }
        Err(_) => lowered,
    }
}

/// Returns the body of `keyword<...>` if `raw` is that composite.
fn composite_body<'a>(raw: &'a str, keyword: &str) -> Result<Option<&'a str>, SchemaError> {
    let Some(head) = raw.get(..keyword.len()) else {
        return Ok(None);
    };
    if !head.eq_ignore_ascii_case(keyword) {
        return Ok(None);
    }
    let rest = raw[keyword.len()..].trim_start();
    if !rest.starts_with('<') {
        return Ok(None);
    }
    if !rest.ends_with('>') || !is_balanced(rest) {
        return Err(SchemaError::InvalidTypeExpression {
            expression: raw.to_string(),
            reason: "unbalanced angle brackets".to_string(),
        });
    }
    Ok(Some(&rest[1..rest.len() - 1]))
}

fn is_balanced(raw: &str) -> bool {
    let mut depth: i32 = 0;
    for ch in raw.chars() {
        match ch {
            '<' => depth += 1,
            '>' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

/// Split on commas that are not nested inside `<...>`.
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, ch) in raw.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&raw[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}
