//! Hand-off, lifecycle event and dead-letter publishing
//!
//! A hand-off tells the downstream loader that a repaired artifact is staged
//! and ready. Lifecycle events and dead letters are informational; the
//! orchestrator logs their publish failures and carries on.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_common::{ColumnSchema, ErrorCode, ErrorStage, FileFingerprint};
use serde::{Deserialize, Serialize};

use crate::envelope::DeliveryEnvelope;
use crate::lifecycle::LifecycleStatus;

pub mod http;
pub mod log;
pub mod recording;

pub use http::HttpPublisher;
pub use log::LogPublisher;
pub use recording::RecordingPublisher;

/// Message type of a hand-off
pub const LOAD_REQUEST: &str = "LOAD_REQUEST";

/// Message type of a lifecycle event
pub const LIFECYCLE_EVENT: &str = "LIFECYCLE_EVENT";

/// Message type of a dead letter
pub const DEAD_LETTER: &str = "DEAD_LETTER";

/// How the loader applies an artifact to its target table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteMode {
    Append,
    Overwrite,
    Upsert,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Append => "APPEND",
            WriteMode::Overwrite => "OVERWRITE",
            WriteMode::Upsert => "UPSERT",
        }
    }
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WriteMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "APPEND" => Ok(WriteMode::Append),
            "OVERWRITE" => Ok(WriteMode::Overwrite),
            "UPSERT" => Ok(WriteMode::Upsert),
            _ => Err(anyhow::anyhow!("Invalid write mode: {}", s)),
        }
    }
}

/// Load request for a staged artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub fingerprint: FileFingerprint,
    pub original_location: String,
    pub artifact_ref: String,
    pub target_namespace: String,
    pub target_table: String,
    pub write_mode: WriteMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upsert_keys: Vec<String>,
    pub row_count: u64,
    pub schema: Vec<ColumnSchema>,
    pub published_at: DateTime<Utc>,
}

/// Notification of a lifecycle transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    #[serde(rename = "type")]
    pub message_type: String,
    pub fingerprint: FileFingerprint,
    pub target_table: String,
    pub status: LifecycleStatus,
    pub error_code: Option<ErrorCode>,
    pub error_stage: Option<ErrorStage>,
    pub error_message: Option<String>,
    pub attempt_count: u32,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

/// Envelope that will not be retried automatically, with its error context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    #[serde(rename = "type")]
    pub message_type: String,
    pub envelope: DeliveryEnvelope,
    /// Absent when the envelope was rejected before the file was read
    pub fingerprint: Option<FileFingerprint>,
    pub target_table: Option<String>,
    pub code: ErrorCode,
    pub stage: ErrorStage,
    pub message: String,
    pub attempt_count: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Outbound collaborator surfaces
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Durably publish a hand-off; an `Err` leaves the record `HANDOFF_FAILED`
    async fn publish_handoff(&self, message: &HandoffMessage) -> Result<()>;

    async fn publish_event(&self, event: &LifecycleEvent) -> Result<()>;

    async fn publish_dead_letter(&self, letter: &DeadLetter) -> Result<()>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use intake_common::ColumnType;

    #[test]
    fn test_handoff_wire_format() {
        let message = HandoffMessage {
            message_type: LOAD_REQUEST.to_string(),
            fingerprint: FileFingerprint::of(b"a"),
            original_location: "landing/orders/a.csv".to_string(),
            artifact_ref: "s3://staging/orders/x.parquet".to_string(),
            target_namespace: "bronze".to_string(),
            target_table: "orders".to_string(),
            write_mode: WriteMode::Append,
            upsert_keys: Vec::new(),
            row_count: 10,
            schema: vec![ColumnSchema::new("id", ColumnType::Integer)],
            published_at: Utc::now(),
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "LOAD_REQUEST");
        assert_eq!(json["writeMode"], "APPEND");
        assert_eq!(json["targetNamespace"], "bronze");
        assert_eq!(json["schema"][0]["type"], "integer");
        assert!(json.get("upsertKeys").is_none());
    }

    #[test]
    fn test_write_mode_parsing() {
        assert_eq!("upsert".parse::<WriteMode>().unwrap(), WriteMode::Upsert);
        assert!("merge".parse::<WriteMode>().is_err());
    }
}
