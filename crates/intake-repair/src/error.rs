//! Repair pipeline errors

use intake_common::{ColumnType, ErrorCode, ErrorStage, LifecycleError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RepairError>;

/// Failure of one repair attempt. Every variant maps onto the lifecycle
/// taxonomy through [`RepairError::code`] and [`RepairError::stage`].
#[derive(Error, Debug)]
pub enum RepairError {
    #[error("File is empty or contains only whitespace")]
    EmptyFile,

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Unreadable {format} content: {message}")]
    Unreadable { format: &'static str, message: String },

    #[error(
        "No parse strategy acceptable: best of {candidates} candidates has overflow rate {best_rate:.3} (max {max_rate:.3})"
    )]
    ParseAmbiguous {
        candidates: usize,
        best_rate: f64,
        max_rate: f64,
    },

    #[error("Row loss detected: file holds {expected} records but {loaded} were loaded")]
    RowLoss { expected: usize, loaded: usize },

    #[error("Cannot coerce value {value:?} in column {column} to {target}")]
    TypeCoercion {
        column: String,
        value: String,
        target: ColumnType,
    },

    #[error("Invalid JSON after repair: {0}")]
    InvalidJson(String),

    #[error("Parquet export failed: {0}")]
    Export(String),
}

impl RepairError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RepairError::EmptyFile => ErrorCode::EmptyFile,
            RepairError::UnsupportedFormat(_) | RepairError::Unreadable { .. } => {
                ErrorCode::UnsupportedFormat
            },
            RepairError::ParseAmbiguous { .. } => ErrorCode::ParseAmbiguous,
            RepairError::RowLoss { .. } => ErrorCode::RowLossDetected,
            RepairError::TypeCoercion { .. } => ErrorCode::TypeCoercionError,
            RepairError::InvalidJson(_) => ErrorCode::InvalidJson,
            RepairError::Export(_) => ErrorCode::ExportFailure,
        }
    }

    pub fn stage(&self) -> ErrorStage {
        match self {
            RepairError::EmptyFile | RepairError::UnsupportedFormat(_) => ErrorStage::Detection,
            RepairError::ParseAmbiguous { .. } => ErrorStage::Strategy,
            RepairError::Unreadable { .. }
            | RepairError::RowLoss { .. }
            | RepairError::InvalidJson(_) => ErrorStage::Load,
            RepairError::TypeCoercion { .. } => ErrorStage::Coercion,
            RepairError::Export(_) => ErrorStage::Export,
        }
    }

    pub fn to_lifecycle_error(&self) -> LifecycleError {
        LifecycleError::new(self.code(), self.stage(), self.to_string())
    }
}

impl From<parquet::errors::ParquetError> for RepairError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        RepairError::Export(err.to_string())
    }
}

impl From<arrow_schema::ArrowError> for RepairError {
    fn from(err: arrow_schema::ArrowError) -> Self {
        RepairError::Export(err.to_string())
    }
}
