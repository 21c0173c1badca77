//! Parquet export of the repaired table

use crate::error::Result;
use crate::table::{ColumnData, RepairedTable};
use arrow_array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, RecordBatch,
    RecordBatchOptions, StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::Datelike;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

const UTC: &str = "UTC";

/// `num_days_from_ce` of 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn to_arrow(data: &ColumnData) -> (DataType, ArrayRef) {
    match data {
        ColumnData::Boolean(v) => (DataType::Boolean, Arc::new(BooleanArray::from(v.clone()))),
        ColumnData::Integer(v) => (DataType::Int64, Arc::new(Int64Array::from(v.clone()))),
        ColumnData::Float(v) => (DataType::Float64, Arc::new(Float64Array::from(v.clone()))),
        ColumnData::Date(v) => {
            let days: Vec<Option<i32>> = v
                .iter()
                .map(|d| d.map(|d| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE))
                .collect();
            (DataType::Date32, Arc::new(Date32Array::from(days)))
        },
        ColumnData::Timestamp(v) => {
            let micros: Vec<Option<i64>> = v.iter().map(|t| t.map(|t| t.timestamp_micros())).collect();
            (
                DataType::Timestamp(TimeUnit::Microsecond, Some(UTC.into())),
                Arc::new(TimestampMicrosecondArray::from(micros).with_timezone(UTC)),
            )
        },
        ColumnData::Text(v) => (
            DataType::Utf8,
            Arc::new(StringArray::from_iter(v.iter().map(|s| s.as_deref()))),
        ),
    }
}

/// Build the Arrow record batch for a repaired table
pub fn to_record_batch(table: &RepairedTable) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.columns.len());
    let mut arrays = Vec::with_capacity(table.columns.len());

    for column in &table.columns {
        let (data_type, array) = to_arrow(&column.data);
        fields.push(Field::new(&column.name, data_type, true));
        arrays.push(array);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(table.row_count()));
    let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)?;
    Ok(batch)
}

/// Encode a repaired table as a snappy-compressed parquet file.
///
/// The output depends only on the table contents, so re-running a repair on
/// the same bytes with the same attempt timestamp yields identical files.
pub fn to_parquet(table: &RepairedTable) -> Result<Vec<u8>> {
    let batch = to_record_batch(table)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), Some(props))?;
    writer.write(&batch)?;
    let bytes = writer.into_inner()?;
    Ok(bytes)
}
