//! In-memory tables passed between repair stages

use chrono::{DateTime, NaiveDate, Utc};
use intake_common::{ColumnSchema, ColumnType};

/// Name of the flag added to rows whose width differed from the header
pub const IS_SHIFTED: &str = "is_shifted";
/// Name of the intra-file duplicate flag column
pub const IS_DUPLICATE: &str = "is_duplicate";
/// Name of the provenance timestamp column
pub const PROCESSED_AT: &str = "processed_at";

/// Columns written by the repair engine itself. Once present in an input
/// they are carried through untouched.
pub const PROTECTED_COLUMNS: [&str; 3] = [PROCESSED_AT, IS_DUPLICATE, IS_SHIFTED];

pub fn is_protected(name: &str) -> bool {
    PROTECTED_COLUMNS.contains(&name)
}

/// All-text table produced by the raw load. Missing fields are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column in row order
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).and_then(|v| v.as_deref()))
    }
}

/// Typed values of one repaired column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Boolean(Vec<Option<bool>>),
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Date(Vec<Option<NaiveDate>>),
    Timestamp(Vec<Option<DateTime<Utc>>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Boolean(_) => ColumnType::Boolean,
            ColumnData::Integer(_) => ColumnType::Integer,
            ColumnData::Float(_) => ColumnType::Float,
            ColumnData::Date(_) => ColumnType::Date,
            ColumnData::Timestamp(_) => ColumnType::Timestamp,
            ColumnData::Text(_) => ColumnType::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Integer(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Date(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical text of one cell, used for row identity
    pub fn render(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Boolean(v) => v.get(row).copied().flatten().map(|b| b.to_string()),
            ColumnData::Integer(v) => v.get(row).copied().flatten().map(|i| i.to_string()),
            ColumnData::Float(v) => v.get(row).copied().flatten().map(|f| f.to_string()),
            ColumnData::Date(v) => v.get(row).copied().flatten().map(|d| d.to_string()),
            ColumnData::Timestamp(v) => v.get(row).copied().flatten().map(|t| t.to_rfc3339()),
            ColumnData::Text(v) => v.get(row).cloned().flatten(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// Typed table ready for export
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairedTable {
    pub columns: Vec<Column>,
    row_count: usize,
}

impl RepairedTable {
    pub fn new(row_count: usize) -> Self {
        Self {
            columns: Vec::new(),
            row_count,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn push(&mut self, name: impl Into<String>, data: ColumnData) {
        debug_assert_eq!(data.len(), self.row_count);
        self.columns.push(Column {
            name: name.into(),
            data,
        });
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns
            .iter()
            .map(|c| ColumnSchema::new(c.name.clone(), c.data.column_type()))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_column_values_tolerate_short_rows() {
        let mut table = RawTable::new(vec!["a".into(), "b".into()]);
        table.rows.push(vec![Some("1".into()), Some("x".into())]);
        table.rows.push(vec![Some("2".into())]);

        let b: Vec<_> = table.column_values(1).collect();
        assert_eq!(b, vec![Some("x"), None]);
    }

    #[test]
    fn test_render_is_canonical() {
        let floats = ColumnData::Float(vec![Some(19.99), None]);
        assert_eq!(floats.render(0).as_deref(), Some("19.99"));
        assert_eq!(floats.render(1), None);
        let bools = ColumnData::Boolean(vec![Some(true)]);
        assert_eq!(bools.render(0).as_deref(), Some("true"));
    }
}
