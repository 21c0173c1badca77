//! Lifecycle state machine
//!
//! ```text
//!            +---------+     repair ok      +------------------+  publish ok  +-------------------+
//!  UNSEEN -->| CLAIMED |------------------->| REPAIR_SUCCEEDED |------------->| HANDOFF_SUCCEEDED |
//!            +---------+                    +------------------+              +-------------------+
//!              |   ^                             |        ^
//!   repair err |   | retry                 publish err    | hand-off retry
//!              v   |                             v        |
//!         +---------------+                 +----------------+
//!         | REPAIR_FAILED |                 | HANDOFF_FAILED |
//!         +---------------+                 +----------------+
//!              |                                   |
//!              +------> DEAD_LETTERED <------------+
//! ```
//!
//! Stale `CLAIMED` and `REPAIR_SUCCEEDED` records may be re-claimed in place.
//! Everything here is pure; the orchestrator applies the results through
//! conditional writes.

use chrono::{DateTime, Duration, Utc};
use intake_common::{ErrorCode, ErrorStage, FileFingerprint, LifecycleError};
use thiserror::Error;

use super::record::{Expected, FileLifecycleRecord, LifecycleStatus};

/// Retry and staleness limits
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Claiming attempts allowed before a fingerprint is dead-lettered
    pub max_attempts: u32,
    /// Age after which an unfinished claim may be taken over
    pub stale_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            stale_after: Duration::seconds(900),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Transition {from} -> {to} is not allowed")]
pub struct TransitionError {
    pub from: String,
    pub to: LifecycleStatus,
}

/// Whether the state machine permits `from -> to`; `None` is `UNSEEN`.
pub fn is_allowed(from: Option<LifecycleStatus>, to: LifecycleStatus) -> bool {
    use LifecycleStatus::*;

    match from {
        None => to == Claimed,
        Some(Claimed) => matches!(to, Claimed | RepairFailed | RepairSucceeded | DeadLettered),
        Some(RepairFailed) => matches!(to, Claimed | DeadLettered),
        Some(RepairSucceeded) => matches!(
            to,
            RepairSucceeded | HandoffSucceeded | HandoffFailed | DeadLettered
        ),
        Some(HandoffFailed) => matches!(to, RepairSucceeded | DeadLettered),
        Some(HandoffSucceeded) | Some(DeadLettered) => false,
    }
}

/// Next version of `record` in status `to`, if the move is allowed
pub fn transition(
    record: &FileLifecycleRecord,
    to: LifecycleStatus,
    now: DateTime<Utc>,
) -> Result<FileLifecycleRecord, TransitionError> {
    if !is_allowed(Some(record.status), to) {
        return Err(TransitionError {
            from: record.status.to_string(),
            to,
        });
    }
    Ok(record.next(to, now))
}

pub fn is_stale(record: &FileLifecycleRecord, now: DateTime<Utc>, policy: &RetryPolicy) -> bool {
    now.signed_duration_since(record.updated_at) >= policy.stale_after
}

/// What a delivery attempt should do given the stored record
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimDecision {
    /// Write `record` under `expected`, then run the repair pipeline
    Repair {
        record: FileLifecycleRecord,
        expected: Expected,
    },
    /// Write `record` under `expected`, then re-publish the staged artifact
    Handoff {
        record: FileLifecycleRecord,
        expected: Expected,
    },
    /// Write `record` under `expected` and route to the dead-letter surface
    DeadLetter {
        record: FileLifecycleRecord,
        expected: Expected,
    },
    /// Nothing to do; report the stored record
    Observe(FileLifecycleRecord),
}

/// Identity of the delivery asking to claim
#[derive(Debug, Clone)]
pub struct ClaimRequest<'a> {
    pub fingerprint: &'a FileFingerprint,
    pub target_table: &'a str,
    pub source_location: &'a str,
    pub now: DateTime<Utc>,
}

/// Decide how a delivery attempt claims a fingerprint.
pub fn decide_claim(
    current: Option<&FileLifecycleRecord>,
    request: &ClaimRequest<'_>,
    policy: &RetryPolicy,
) -> ClaimDecision {
    let Some(current) = current else {
        return ClaimDecision::Repair {
            record: FileLifecycleRecord::claimed(
                request.fingerprint.clone(),
                request.target_table,
                request.source_location,
                request.now,
            ),
            expected: Expected::Absent,
        };
    };

    let expected = current.expectation();
    let under_bound = current.attempt_count < policy.max_attempts;
    let reclaim = |status: LifecycleStatus| {
        let mut record = current.next(status, request.now);
        record.attempt_count += 1;
        record.source_location = request.source_location.to_string();
        record
    };
    let dead_letter = |error: Option<LifecycleError>| {
        let mut record = current.next(LifecycleStatus::DeadLettered, request.now);
        if error.is_some() {
            record.last_error = error;
        }
        ClaimDecision::DeadLetter { record, expected }
    };

    match current.status {
        LifecycleStatus::RepairFailed => {
            let retryable = current
                .last_error
                .as_ref()
                .map(|e| e.code.is_retryable())
                .unwrap_or(true);
            if retryable && under_bound {
                ClaimDecision::Repair {
                    record: reclaim(LifecycleStatus::Claimed),
                    expected,
                }
            } else {
                dead_letter(None)
            }
        },
        LifecycleStatus::HandoffFailed if under_bound => ClaimDecision::Handoff {
            record: reclaim(LifecycleStatus::RepairSucceeded),
            expected,
        },
        LifecycleStatus::HandoffFailed => dead_letter(None),
        LifecycleStatus::Claimed if is_stale(current, request.now, policy) => {
            if under_bound {
                ClaimDecision::Repair {
                    record: reclaim(LifecycleStatus::Claimed),
                    expected,
                }
            } else {
                dead_letter(Some(LifecycleError::new(
                    ErrorCode::Timeout,
                    ErrorStage::Claim,
                    format!(
                        "claim abandoned after {} attempts without completing",
                        current.attempt_count
                    ),
                )))
            }
        },
        LifecycleStatus::RepairSucceeded if is_stale(current, request.now, policy) => {
            if under_bound {
                ClaimDecision::Handoff {
                    record: reclaim(LifecycleStatus::RepairSucceeded),
                    expected,
                }
            } else {
                dead_letter(Some(LifecycleError::new(
                    ErrorCode::Timeout,
                    ErrorStage::Handoff,
                    format!(
                        "hand-off abandoned after {} attempts without completing",
                        current.attempt_count
                    ),
                )))
            }
        },
        _ => ClaimDecision::Observe(current.clone()),
    }
}
