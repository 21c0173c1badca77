//! JSON and newline-delimited JSON loading with textual repair
//!
//! Invalid content gets one repair pass: control characters are removed,
//! trailing commas before `}`/`]` are dropped and single-quoted tokens are
//! rewritten with double quotes. Repair is all-or-nothing: if any record is
//! still invalid afterwards the whole file fails with `INVALID_JSON`.

use crate::error::{RepairError, Result};
use crate::load::LoadedTable;
use crate::normalize::normalize_columns;
use crate::patterns::{json_control_chars, json_single_quoted, json_trailing_comma};
use crate::table::RawTable;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Top-level layout of a JSON file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonShape {
    /// `[ {...}, {...} ]`
    Array,
    /// A single top-level object
    Document,
    /// One object per line
    Lines,
}

pub fn detect_json_shape(text: &str) -> Result<JsonShape> {
    match text.trim_start().chars().next() {
        Some('[') => Ok(JsonShape::Array),
        Some('{') => {
            if matches!(serde_json::from_str::<Value>(text), Ok(Value::Object(_))) {
                Ok(JsonShape::Document)
            } else {
                Ok(JsonShape::Lines)
            }
        },
        Some(other) => Err(RepairError::InvalidJson(format!(
            "content starts with {:?}, expected '[' or '{{'",
            other
        ))),
        None => Err(RepairError::EmptyFile),
    }
}

/// Apply the textual repair heuristics to one JSON fragment
pub fn repair_json(raw: &str) -> String {
    let cleaned = json_control_chars().replace_all(raw, "");
    let cleaned = json_trailing_comma().replace_all(&cleaned, "$1");
    json_single_quoted().replace_all(&cleaned, "\"$1\"").into_owned()
}

fn parse_with_repair(raw: &str) -> std::result::Result<(Value, bool), serde_json::Error> {
    match serde_json::from_str(raw) {
        Ok(value) => Ok((value, false)),
        Err(_) => serde_json::from_str(&repair_json(raw)).map(|v| (v, true)),
    }
}

/// Load JSON text of any supported shape.
pub fn load_json(text: &str) -> Result<(LoadedTable, JsonShape)> {
    let shape = detect_json_shape(text)?;

    let (records, repaired) = match shape {
        JsonShape::Array | JsonShape::Document => {
            let (value, repaired) =
                parse_with_repair(text).map_err(|e| RepairError::InvalidJson(e.to_string()))?;
            match value {
                Value::Array(items) => (items, usize::from(repaired)),
                object @ Value::Object(_) => (vec![object], usize::from(repaired)),
                other => {
                    return Err(RepairError::InvalidJson(format!(
                        "top-level value is {}, expected an array or object",
                        type_name(&other)
                    )))
                },
            }
        },
        JsonShape::Lines => {
            let mut records = Vec::new();
            let mut repaired = 0usize;
            for (index, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let (value, was_repaired) = parse_with_repair(line).map_err(|e| {
                    RepairError::InvalidJson(format!("line {}: {}", index + 1, e))
                })?;
                repaired += usize::from(was_repaired);
                records.push(value);
            }
            (records, repaired)
        },
    };

    if repaired > 0 {
        tracing::info!(repaired, shape = ?shape, "Repaired invalid JSON content");
    }

    let source_records = records.len();
    Ok((
        LoadedTable {
            table: records_to_table(records),
            source_records,
            shifted_rows: 0,
        },
        shape,
    ))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Flatten records into a text table. Keys become columns in first-seen
/// order; non-object records land in a `value` column.
fn records_to_table(records: Vec<Value>) -> RawTable {
    let mut keys: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    let mut key_slot = |key: &str, keys: &mut Vec<String>| -> usize {
        if let Some(&slot) = index.get(key) {
            return slot;
        }
        keys.push(key.to_string());
        index.insert(key.to_string(), keys.len() - 1);
        keys.len() - 1
    };

    let mut sparse: Vec<Vec<(usize, Option<String>)>> = Vec::with_capacity(records.len());
    for record in records {
        let cells = match record {
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| (key_slot(&k, &mut keys), cell_text(v)))
                .collect(),
            other => vec![(key_slot("value", &mut keys), cell_text(other))],
        };
        sparse.push(cells);
    }

    let width = keys.len();
    let rows = sparse
        .into_iter()
        .map(|cells| {
            let mut row = vec![None; width];
            for (slot, value) in cells {
                row[slot] = value;
            }
            row
        })
        .collect();

    RawTable {
        columns: normalize_columns(&keys),
        rows,
    }
}

fn cell_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        nested => Some(nested.to_string()),
    }
}
