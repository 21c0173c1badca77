//! Lifecycle record and status types

use chrono::{DateTime, Utc};
use intake_common::{ColumnSchema, FileFingerprint, LifecycleError};
use serde::{Deserialize, Serialize};

/// Processing state of one fingerprint.
///
/// `UNSEEN` is implicit: it is the absence of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStatus {
    Claimed,
    RepairFailed,
    RepairSucceeded,
    HandoffFailed,
    HandoffSucceeded,
    DeadLettered,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Claimed => "CLAIMED",
            LifecycleStatus::RepairFailed => "REPAIR_FAILED",
            LifecycleStatus::RepairSucceeded => "REPAIR_SUCCEEDED",
            LifecycleStatus::HandoffFailed => "HANDOFF_FAILED",
            LifecycleStatus::HandoffSucceeded => "HANDOFF_SUCCEEDED",
            LifecycleStatus::DeadLettered => "DEAD_LETTERED",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleStatus::HandoffSucceeded | LifecycleStatus::DeadLettered
        )
    }

    /// Failed states a new delivery may claim again
    pub fn is_retryable_failure(&self) -> bool {
        matches!(
            self,
            LifecycleStatus::RepairFailed | LifecycleStatus::HandoffFailed
        )
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LifecycleStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLAIMED" => Ok(LifecycleStatus::Claimed),
            "REPAIR_FAILED" => Ok(LifecycleStatus::RepairFailed),
            "REPAIR_SUCCEEDED" => Ok(LifecycleStatus::RepairSucceeded),
            "HANDOFF_FAILED" => Ok(LifecycleStatus::HandoffFailed),
            "HANDOFF_SUCCEEDED" => Ok(LifecycleStatus::HandoffSucceeded),
            "DEAD_LETTERED" => Ok(LifecycleStatus::DeadLettered),
            _ => Err(anyhow::anyhow!("Invalid lifecycle status: {}", s)),
        }
    }
}

/// Durable per-fingerprint processing record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLifecycleRecord {
    pub fingerprint: FileFingerprint,
    pub status: LifecycleStatus,
    pub target_table: String,
    /// Location of the most recent claiming delivery
    pub source_location: String,
    pub attempt_count: u32,
    pub last_error: Option<LifecycleError>,
    pub row_count_raw: Option<u64>,
    pub row_count_repaired: Option<u64>,
    pub artifact_ref: Option<String>,
    pub schema: Option<Vec<ColumnSchema>>,
    /// Optimistic-concurrency token, bumped on every successful write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileLifecycleRecord {
    /// First claim of a fingerprint
    pub fn claimed(
        fingerprint: FileFingerprint,
        target_table: impl Into<String>,
        source_location: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            fingerprint,
            status: LifecycleStatus::Claimed,
            target_table: target_table.into(),
            source_location: source_location.into(),
            attempt_count: 1,
            last_error: None,
            row_count_raw: None,
            row_count_repaired: None,
            artifact_ref: None,
            schema: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// What a conditional write against this record must observe
    pub fn expectation(&self) -> Expected {
        Expected::Observed {
            status: self.status,
            version: self.version,
        }
    }

    /// Copy for the next write: version bumped and `updated_at` refreshed
    pub fn next(&self, status: LifecycleStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            version: self.version + 1,
            updated_at: now,
            ..self.clone()
        }
    }
}

/// Precondition of a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// No record may exist yet
    Absent,
    /// The stored record must still carry this status and version
    Observed {
        status: LifecycleStatus,
        version: i64,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_serde() {
        for status in [
            LifecycleStatus::Claimed,
            LifecycleStatus::RepairFailed,
            LifecycleStatus::RepairSucceeded,
            LifecycleStatus::HandoffFailed,
            LifecycleStatus::HandoffSucceeded,
            LifecycleStatus::DeadLettered,
        ] {
            assert_eq!(status.as_str().parse::<LifecycleStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
        assert!("UNSEEN".parse::<LifecycleStatus>().is_err());
    }

    #[test]
    fn test_next_bumps_version_only() {
        let now = Utc::now();
        let record = FileLifecycleRecord::claimed(FileFingerprint::of(b"x"), "orders", "landing/orders/a.csv", now);
        let later = now + chrono::Duration::seconds(5);
        let next = record.next(LifecycleStatus::RepairFailed, later);

        assert_eq!(next.version, 2);
        assert_eq!(next.attempt_count, 1);
        assert_eq!(next.created_at, now);
        assert_eq!(next.updated_at, later);
        assert_eq!(
            record.expectation(),
            Expected::Observed {
                status: LifecycleStatus::Claimed,
                version: 1
            }
        );
    }
}
