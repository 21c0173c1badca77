//! Lifecycle store contract
//!
//! A store only knows how to read a record and how to write one under a
//! precondition. Which writes are legal is decided by
//! [`crate::lifecycle::machine`], so every backend enforces identical rules.

use async_trait::async_trait;
use intake_common::FileFingerprint;
use thiserror::Error;

use super::record::{Expected, FileLifecycleRecord};

/// Store backend failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt lifecycle record for {fingerprint}: {message}")]
    Corrupt {
        fingerprint: String,
        message: String,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a conditional write
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    /// The write was applied; carries the stored record
    Written(FileLifecycleRecord),
    /// The precondition did not hold; carries the record that is stored now
    Contended(Option<FileLifecycleRecord>),
}

impl PutOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, PutOutcome::Written(_))
    }
}

/// Strongly consistent keyed record store with compare-and-swap writes
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    /// Fetch the record for a fingerprint, if any
    async fn get(&self, fingerprint: &FileFingerprint) -> StoreResult<Option<FileLifecycleRecord>>;

    /// Write `record` only if the stored state matches `expected`.
    ///
    /// Never overwrites on a mismatch. `record.version` must already be the
    /// new version.
    async fn put(&self, record: &FileLifecycleRecord, expected: Expected) -> StoreResult<PutOutcome>;

    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Liveness probe
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
