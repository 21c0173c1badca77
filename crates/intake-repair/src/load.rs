//! Raw load: every supported format into an all-text [`RawTable`]
//!
//! Values are never parsed here. Type decisions happen later, on the full
//! table, so a numeric-looking identifier cannot lose its leading zeros at
//! load time.

use crate::error::{RepairError, Result};
use crate::normalize::{dedupe_names, normalize_columns};
use crate::scan::count_records;
use crate::strategy::{ParseStrategy, QuoteStyle};
use crate::table::{RawTable, IS_SHIFTED};
use arrow_array::Array;
use arrow_cast::display::{ArrayFormatter, FormatOptions};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

/// Raw table plus the counts needed for the row-loss guard
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: RawTable,
    /// Data records the source holds according to an independent count
    pub source_records: usize,
    /// Rows whose width differed from the header
    pub shifted_rows: usize,
}

/// Parse delimited text into records, skipping whitespace-only lines.
pub(crate) fn read_records(text: &str, delimiter: char, quote: QuoteStyle) -> Result<Vec<Vec<String>>> {
    if !delimiter.is_ascii() {
        return Err(RepairError::Unreadable {
            format: "csv",
            message: format!("delimiter {:?} is not a single byte", delimiter),
        });
    }

    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter as u8);
    match quote.quote_char() {
        Some(q) => {
            builder.quoting(true).quote(q as u8);
        },
        None => {
            builder.quoting(false);
        },
    }
    if quote == QuoteStyle::BackslashEscape {
        builder.double_quote(false).escape(Some(b'\\'));
    } else {
        builder.double_quote(true);
    }

    let mut reader = builder.from_reader(text.as_bytes());
    let mut parsed = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| RepairError::Unreadable {
            format: "csv",
            message: e.to_string(),
        })?;
        let start = record.position().map(|p| p.byte() as usize).unwrap_or(0);
        parsed.push((start, record.iter().map(str::to_string).collect::<Vec<_>>()));
    }

    let ends: Vec<usize> = parsed
        .iter()
        .skip(1)
        .map(|(start, _)| *start)
        .chain(std::iter::once(text.len()))
        .collect();

    let records = parsed
        .into_iter()
        .zip(ends)
        .filter(|((start, _), end)| {
            text.get(*start..*end)
                .map(|raw| !raw.trim().is_empty())
                .unwrap_or(true)
        })
        .map(|((_, fields), _)| fields)
        .collect();

    Ok(records)
}

/// Load delimited text under the selected strategy.
///
/// Width mismatches are repaired without dropping values: short rows are
/// padded with missing values, extra fields land in `extra_N` columns, and
/// every such row is flagged in `is_shifted`. A loaded record count that
/// differs from [`count_records`] fails with `ROW_LOSS_DETECTED`.
pub fn load_delimited(text: &str, strategy: &ParseStrategy) -> Result<LoadedTable> {
    let records = read_records(text, strategy.delimiter, strategy.quote)?;
    let expected = count_records(text, strategy);
    let header_rows = usize::from(strategy.has_header);

    if records.len() != expected {
        return Err(RepairError::RowLoss {
            expected: expected.saturating_sub(header_rows),
            loaded: records.len().saturating_sub(header_rows),
        });
    }

    let mut records = records.into_iter();
    let (mut columns, width) = if strategy.has_header {
        let header = records.next().unwrap_or_default();
        (normalize_columns(&header), header.len())
    } else {
        (Vec::new(), 0)
    };

    let data: Vec<Vec<String>> = records.collect();
    let width = if strategy.has_header {
        width
    } else {
        let width = data.first().map(Vec::len).unwrap_or(0);
        columns = (1..=width).map(|i| format!("column_{}", i)).collect();
        width
    };

    let max_width = data.iter().map(Vec::len).max().unwrap_or(width).max(width);
    let shifted_rows = data.iter().filter(|r| r.len() != width).count();
    columns.extend((1..=max_width - width).map(|i| format!("extra_{}", i)));

    let add_shift_flag = shifted_rows > 0 && !columns.iter().any(|c| c == IS_SHIFTED);
    if add_shift_flag {
        columns.push(IS_SHIFTED.to_string());
    }
    let columns = dedupe_names(columns);

    let rows = data
        .into_iter()
        .map(|fields| {
            let shifted = fields.len() != width;
            let mut row: Vec<Option<String>> = fields
                .into_iter()
                .map(|f| if f.is_empty() { None } else { Some(f) })
                .collect();
            row.resize(max_width, None);
            if add_shift_flag {
                row.push(Some(shifted.to_string()));
            }
            row
        })
        .collect();

    if shifted_rows > 0 {
        tracing::info!(
            shifted_rows,
            extra_columns = max_width - width,
            "Repaired rows whose width differed from the header"
        );
    }

    Ok(LoadedTable {
        table: RawTable { columns, rows },
        source_records: expected - header_rows,
        shifted_rows,
    })
}

/// Load a parquet file, rendering every column to text.
pub fn load_parquet(bytes: &[u8]) -> Result<LoadedTable> {
    let unreadable = |message: String| RepairError::Unreadable {
        format: "parquet",
        message,
    };

    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::copy_from_slice(bytes))
        .map_err(|e| unreadable(e.to_string()))?;
    let declared_rows = usize::try_from(builder.metadata().file_metadata().num_rows())
        .map_err(|e| unreadable(e.to_string()))?;
    let names: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().map_err(|e| unreadable(e.to_string()))?;

    let options = FormatOptions::default();
    let mut rows: Vec<Vec<Option<String>>> = Vec::with_capacity(declared_rows);
    for batch in reader {
        let batch = batch.map_err(|e| unreadable(e.to_string()))?;
        let formatters = batch
            .columns()
            .iter()
            .map(|c| ArrayFormatter::try_new(c.as_ref(), &options))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| unreadable(e.to_string()))?;

        for row in 0..batch.num_rows() {
            let values = batch
                .columns()
                .iter()
                .zip(&formatters)
                .map(|(column, formatter)| {
                    (!column.is_null(row)).then(|| formatter.value(row).to_string())
                })
                .collect();
            rows.push(values);
        }
    }

    if rows.len() != declared_rows {
        return Err(RepairError::RowLoss {
            expected: declared_rows,
            loaded: rows.len(),
        });
    }

    Ok(LoadedTable {
        table: RawTable {
            columns: normalize_columns(&names),
            rows,
        },
        source_records: declared_rows,
        shifted_rows: 0,
    })
}

/// Load the first worksheet of a spreadsheet. The first row is the header.
#[cfg(feature = "excel")]
pub fn load_excel(bytes: &[u8]) -> Result<LoadedTable> {
    use calamine::Reader;

    let unreadable = |message: String| RepairError::Unreadable {
        format: "excel",
        message,
    };

    let mut workbook = calamine::open_workbook_auto_from_rs(std::io::Cursor::new(bytes.to_vec()))
        .map_err(|e| unreadable(e.to_string()))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| unreadable("workbook has no worksheets".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| unreadable(e.to_string()))?;

    let mut sheet_rows = range.rows();
    let header: Vec<String> = sheet_rows
        .next()
        .map(|cells| cells.iter().map(|c| c.to_string()).collect())
        .unwrap_or_default();
    let rows: Vec<Vec<Option<String>>> = sheet_rows
        .map(|cells| {
            cells
                .iter()
                .map(|c| {
                    let text = c.to_string();
                    (!text.is_empty()).then_some(text)
                })
                .collect()
        })
        .collect();

    let declared_rows = range.height().saturating_sub(1);
    if rows.len() != declared_rows {
        return Err(RepairError::RowLoss {
            expected: declared_rows,
            loaded: rows.len(),
        });
    }

    Ok(LoadedTable {
        table: RawTable {
            columns: normalize_columns(&header),
            rows,
        },
        source_records: declared_rows,
        shifted_rows: 0,
    })
}

#[cfg(not(feature = "excel"))]
pub fn load_excel(_bytes: &[u8]) -> Result<LoadedTable> {
    Err(RepairError::UnsupportedFormat(
        "spreadsheet input requires the `excel` feature".to_string(),
    ))
}
