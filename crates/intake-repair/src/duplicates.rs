//! Intra-file duplicate flagging
//!
//! Rows are never removed. A row whose identity key matches an earlier row
//! in file order is flagged; the first occurrence is not. Identity is the
//! text as loaded, before coercion, so `1.0` and `1.00` are distinct rows.

use crate::table::{is_protected, ColumnData, RawTable};
use std::collections::HashSet;

/// Columns that make up a row's identity.
///
/// Declared primary-key columns are used when every one of them exists in the
/// table; otherwise the full row minus engine-written columns.
pub fn identity_columns(table: &RawTable, primary_keys: &[String]) -> Vec<usize> {
    if !primary_keys.is_empty() {
        let indexes: Option<Vec<usize>> = primary_keys
            .iter()
            .map(|key| table.column_index(key))
            .collect();
        match indexes {
            Some(indexes) => return indexes,
            None => tracing::warn!(
                primary_keys = ?primary_keys,
                "Declared primary keys missing from table, using full row identity"
            ),
        }
    }

    table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| !is_protected(name))
        .map(|(i, _)| i)
        .collect()
}

/// Flag rows identical to an earlier row on the given columns
pub fn flag_duplicates(table: &RawTable, key_columns: &[usize]) -> Vec<bool> {
    let mut seen: HashSet<Vec<Option<&str>>> = HashSet::with_capacity(table.row_count());

    table
        .rows
        .iter()
        .map(|row| {
            let key: Vec<Option<&str>> = key_columns
                .iter()
                .map(|&col| row.get(col).and_then(|v| v.as_deref()))
                .collect();
            !seen.insert(key)
        })
        .collect()
}

/// Read flags carried in an existing `is_duplicate` column
pub fn existing_flags(data: &ColumnData) -> Vec<bool> {
    match data {
        ColumnData::Boolean(values) => values.iter().map(|v| v.unwrap_or(false)).collect(),
        other => (0..other.len())
            .map(|row| {
                other
                    .render(row)
                    .map(|v| v.trim().eq_ignore_ascii_case("true"))
                    .unwrap_or(false)
            })
            .collect(),
    }
}
