//! Error types and the ingestion failure taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, IntakeError>;

/// Main error type for the common crate
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Failure codes recorded on lifecycle records and dead-letter payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Upload is not under a table folder
    InvalidPath,
    /// Delivery envelope is malformed or names a non-file object
    InvalidEnvelope,
    /// No parse strategy candidate was acceptable
    ParseAmbiguous,
    /// Raw load recovered a different number of rows than the file holds
    RowLossDetected,
    /// A coercion predicate passed but the cast failed
    TypeCoercionError,
    /// File is zero bytes or whitespace only
    EmptyFile,
    /// File format could not be recognized or read
    UnsupportedFormat,
    /// JSON content could not be repaired into valid records
    InvalidJson,
    /// Columnar encoding of the repaired table failed
    ExportFailure,
    /// Lost a conditional write race
    StoreContention,
    /// Landing fetch, staging write or hand-off publish failed
    TransportFailure,
    /// Repair or an external call exceeded its time bound
    Timeout,
    /// The lifecycle store itself is unavailable
    StoreFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidPath => "INVALID_PATH",
            ErrorCode::InvalidEnvelope => "INVALID_ENVELOPE",
            ErrorCode::ParseAmbiguous => "PARSE_AMBIGUOUS",
            ErrorCode::RowLossDetected => "ROW_LOSS_DETECTED",
            ErrorCode::TypeCoercionError => "TYPE_COERCION_ERROR",
            ErrorCode::EmptyFile => "EMPTY_FILE",
            ErrorCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::ExportFailure => "EXPORT_FAILURE",
            ErrorCode::StoreContention => "STORE_CONTENTION",
            ErrorCode::TransportFailure => "TRANSPORT_FAILURE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::StoreFailure => "STORE_FAILURE",
        }
    }

    /// Whether a later delivery attempt may retry automatically.
    ///
    /// Non-retryable codes dead-letter on first occurrence. `PARSE_AMBIGUOUS`
    /// needs an operator to change something before a retry can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RowLossDetected
                | ErrorCode::TransportFailure
                | ErrorCode::Timeout
                | ErrorCode::StoreFailure
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = IntakeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let code = match s {
            "INVALID_PATH" => ErrorCode::InvalidPath,
            "INVALID_ENVELOPE" => ErrorCode::InvalidEnvelope,
            "PARSE_AMBIGUOUS" => ErrorCode::ParseAmbiguous,
            "ROW_LOSS_DETECTED" => ErrorCode::RowLossDetected,
            "TYPE_COERCION_ERROR" => ErrorCode::TypeCoercionError,
            "EMPTY_FILE" => ErrorCode::EmptyFile,
            "UNSUPPORTED_FORMAT" => ErrorCode::UnsupportedFormat,
            "INVALID_JSON" => ErrorCode::InvalidJson,
            "EXPORT_FAILURE" => ErrorCode::ExportFailure,
            "STORE_CONTENTION" => ErrorCode::StoreContention,
            "TRANSPORT_FAILURE" => ErrorCode::TransportFailure,
            "TIMEOUT" => ErrorCode::Timeout,
            "STORE_FAILURE" => ErrorCode::StoreFailure,
            other => return Err(IntakeError::Parse(format!("unknown error code: {}", other))),
        };
        Ok(code)
    }
}

/// Processing stage in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Validation,
    Fetch,
    Claim,
    Detection,
    Strategy,
    Load,
    Normalize,
    Coercion,
    Duplicates,
    Provenance,
    Export,
    Staging,
    Handoff,
}

impl ErrorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStage::Validation => "validation",
            ErrorStage::Fetch => "fetch",
            ErrorStage::Claim => "claim",
            ErrorStage::Detection => "detection",
            ErrorStage::Strategy => "strategy",
            ErrorStage::Load => "load",
            ErrorStage::Normalize => "normalize",
            ErrorStage::Coercion => "coercion",
            ErrorStage::Duplicates => "duplicates",
            ErrorStage::Provenance => "provenance",
            ErrorStage::Export => "export",
            ErrorStage::Staging => "staging",
            ErrorStage::Handoff => "handoff",
        }
    }
}

impl std::fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorStage {
    type Err = IntakeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let stage = match s {
            "validation" => ErrorStage::Validation,
            "fetch" => ErrorStage::Fetch,
            "claim" => ErrorStage::Claim,
            "detection" => ErrorStage::Detection,
            "strategy" => ErrorStage::Strategy,
            "load" => ErrorStage::Load,
            "normalize" => ErrorStage::Normalize,
            "coercion" => ErrorStage::Coercion,
            "duplicates" => ErrorStage::Duplicates,
            "provenance" => ErrorStage::Provenance,
            "export" => ErrorStage::Export,
            "staging" => ErrorStage::Staging,
            "handoff" => ErrorStage::Handoff,
            other => return Err(IntakeError::Parse(format!("unknown error stage: {}", other))),
        };
        Ok(stage)
    }
}

/// Structured failure stored as `lastError` on a lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleError {
    pub code: ErrorCode,
    pub stage: ErrorStage,
    pub message: String,
}

impl LifecycleError {
    pub fn new(code: ErrorCode, stage: ErrorStage, message: impl Into<String>) -> Self {
        Self {
            code,
            stage,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {}", self.code, self.stage, self.message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_round_trips_through_str() {
        for code in [
            ErrorCode::InvalidPath,
            ErrorCode::ParseAmbiguous,
            ErrorCode::RowLossDetected,
            ErrorCode::TypeCoercionError,
            ErrorCode::StoreContention,
            ErrorCode::TransportFailure,
            ErrorCode::Timeout,
        ] {
            assert_eq!(code.as_str().parse::<ErrorCode>().unwrap(), code);
        }
        assert!("NOPE".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ErrorCode::RowLossDetected.is_retryable());
        assert!(ErrorCode::TransportFailure.is_retryable());
        assert!(!ErrorCode::InvalidPath.is_retryable());
        assert!(!ErrorCode::ParseAmbiguous.is_retryable());
        assert!(!ErrorCode::TypeCoercionError.is_retryable());
    }

    #[test]
    fn test_lifecycle_error_serializes_wire_codes() {
        let err = LifecycleError::new(ErrorCode::RowLossDetected, ErrorStage::Load, "3 rows lost");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "ROW_LOSS_DETECTED");
        assert_eq!(json["stage"], "load");
        assert_eq!(err.to_string(), "ROW_LOSS_DETECTED at load: 3 rows lost");
    }
}
