//! Ingestion orchestrator
//!
//! [`Orchestrator::process`] handles one delivery attempt end to end:
//!
//! 1. validate the envelope and resolve the target table from its path
//! 2. fetch the landed bytes and fingerprint them
//! 3. claim the fingerprint through a conditional write
//! 4. repair, stage the artifact, record `REPAIR_SUCCEEDED`
//! 5. publish the hand-off, record `HANDOFF_SUCCEEDED` or `HANDOFF_FAILED`
//!
//! Any number of attempts for the same file may run at once; the store's
//! conditional write is the only mutual exclusion. `process` never returns an
//! error: every failure ends up in the lifecycle record, the returned
//! [`Outcome`], or both.

use chrono::{DateTime, Utc};
use intake_common::{ErrorCode, ErrorStage, FileFingerprint, LifecycleError};
use intake_repair::{repair, HeaderClassifier, RepairConfig, RepairContext, RepairResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::config::IngestConfig;
use crate::envelope::{resolve_target_table, DeliveryEnvelope};
use crate::handoff::{DeadLetter, HandoffMessage, LifecycleEvent, Publisher, DEAD_LETTER, LIFECYCLE_EVENT, LOAD_REQUEST};
use crate::lifecycle::{
    decide_claim, transition, ClaimDecision, ClaimRequest, Expected, FileLifecycleRecord,
    LifecycleStatus, LifecycleStore, PutOutcome, RetryPolicy,
};
use crate::storage::{artifact_path, ArtifactStore, LandingSource};

/// What a delivery attempt amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    /// This attempt published the hand-off
    Completed,
    /// The file already reached a terminal state; nothing was done
    Duplicate,
    /// Another attempt holds a live claim; nothing was done
    InFlight,
    /// This attempt failed; the record (if any) carries the error
    Failed,
    /// The envelope can never be processed
    Rejected,
}

/// Structured result of [`Orchestrator::process`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub disposition: Disposition,
    pub status: Option<LifecycleStatus>,
    pub fingerprint: Option<FileFingerprint>,
    pub target_table: Option<String>,
    pub attempt_count: Option<u32>,
    pub row_count_repaired: Option<u64>,
    pub artifact_ref: Option<String>,
    pub error: Option<LifecycleError>,
}

impl Outcome {
    fn from_record(disposition: Disposition, record: &FileLifecycleRecord) -> Self {
        Self {
            disposition,
            status: Some(record.status),
            fingerprint: Some(record.fingerprint.clone()),
            target_table: Some(record.target_table.clone()),
            attempt_count: Some(record.attempt_count),
            row_count_repaired: record.row_count_repaired,
            artifact_ref: record.artifact_ref.clone(),
            error: record.last_error.clone(),
        }
    }

    /// Report a record this attempt did not change
    fn observed(record: &FileLifecycleRecord) -> Self {
        let disposition = match record.status {
            LifecycleStatus::HandoffSucceeded | LifecycleStatus::DeadLettered => Disposition::Duplicate,
            LifecycleStatus::Claimed | LifecycleStatus::RepairSucceeded => Disposition::InFlight,
            LifecycleStatus::RepairFailed | LifecycleStatus::HandoffFailed => Disposition::Failed,
        };
        Self::from_record(disposition, record)
    }

    /// Failure that left no record behind
    fn unrecorded(
        disposition: Disposition,
        fingerprint: Option<FileFingerprint>,
        target_table: Option<String>,
        error: LifecycleError,
    ) -> Self {
        Self {
            disposition,
            status: None,
            fingerprint,
            target_table,
            attempt_count: None,
            row_count_repaired: None,
            artifact_ref: None,
            error: Some(error),
        }
    }

    /// Envelope that can never be processed
    pub fn rejected(error: LifecycleError) -> Self {
        Self::unrecorded(Disposition::Rejected, None, None, error)
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(LifecycleStatus::HandoffSucceeded)
    }
}

/// Per-attempt bookkeeping
struct Attempt<'a> {
    envelope: &'a DeliveryEnvelope,
    target_table: &'a str,
    started: Instant,
}

impl Attempt<'_> {
    fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// Composes identity, lifecycle store, repair pipeline, staging and hand-off
pub struct Orchestrator {
    store: Arc<dyn LifecycleStore>,
    landing: Arc<dyn LandingSource>,
    artifacts: Arc<dyn ArtifactStore>,
    publisher: Arc<dyn Publisher>,
    classifier: Option<Arc<dyn HeaderClassifier>>,
    ingest: IngestConfig,
    repair: RepairConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        landing: Arc<dyn LandingSource>,
        artifacts: Arc<dyn ArtifactStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            store,
            landing,
            artifacts,
            publisher,
            classifier: None,
            ingest: IngestConfig::default(),
            repair: RepairConfig::default(),
        }
    }

    pub fn with_ingest_config(mut self, ingest: IngestConfig) -> Self {
        self.ingest = ingest;
        self
    }

    pub fn with_repair_config(mut self, repair: RepairConfig) -> Self {
        self.repair = repair;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn HeaderClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn store(&self) -> &Arc<dyn LifecycleStore> {
        &self.store
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.ingest.max_attempts,
            stale_after: chrono::Duration::seconds(
                i64::try_from(self.ingest.stale_claim_secs).unwrap_or(i64::MAX),
            ),
        }
    }

    fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest.io_timeout_secs)
    }

    /// Process one delivery attempt
    #[instrument(skip(self, envelope), fields(source_location = %envelope.source_location))]
    pub async fn process(&self, envelope: DeliveryEnvelope) -> Outcome {
        let started = Instant::now();

        if let Err(error) = envelope.validate() {
            info!(error_code = %error.code, "Ignoring delivery: {}", error.message);
            return Outcome::rejected(error);
        }

        let target_table = match resolve_target_table(&envelope.source_location, &self.ingest.landing_prefix) {
            Ok(table) => table,
            Err(error) => {
                warn!(error_code = %error.code, "Rejecting delivery: {}", error.message);
                self.send_dead_letter(&envelope, None, None, &error, 0).await;
                return Outcome::rejected(error);
            },
        };

        let attempt = Attempt {
            envelope: &envelope,
            target_table: &target_table,
            started,
        };

        let bytes = match self.fetch(&envelope).await {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(target_table = %target_table, error_code = %error.code, "Fetch failed: {}", error.message);
                return Outcome::unrecorded(Disposition::Failed, None, Some(target_table.clone()), error);
            },
        };

        let fingerprint = FileFingerprint::of(&bytes);
        debug!(fingerprint = %fingerprint, size = bytes.len(), "Fingerprinted delivery");

        let current = match self.store_call(ErrorStage::Claim, self.store.get(&fingerprint)).await {
            Ok(current) => current,
            Err(error) => {
                return Outcome::unrecorded(Disposition::Failed, Some(fingerprint), Some(target_table.clone()), error);
            },
        };

        let request = ClaimRequest {
            fingerprint: &fingerprint,
            target_table: &target_table,
            source_location: &envelope.source_location,
            now: Utc::now(),
        };

        match decide_claim(current.as_ref(), &request, &self.policy()) {
            ClaimDecision::Observe(record) => {
                info!(
                    fingerprint = %fingerprint,
                    status = %record.status,
                    attempt = record.attempt_count,
                    "Fingerprint already claimed; reporting stored outcome"
                );
                Outcome::observed(&record)
            },
            ClaimDecision::Repair { record, expected } => match self.claim(record, expected).await {
                Ok(claimed) => {
                    info!(
                        fingerprint = %fingerprint,
                        target_table = %target_table,
                        attempt = claimed.attempt_count,
                        "Claimed for repair"
                    );
                    self.repair_and_stage(&attempt, claimed, bytes).await
                },
                Err(outcome) => *outcome,
            },
            ClaimDecision::Handoff { record, expected } => match self.claim(record, expected).await {
                Ok(claimed) => {
                    info!(
                        fingerprint = %fingerprint,
                        attempt = claimed.attempt_count,
                        "Claimed for hand-off retry"
                    );
                    self.hand_off(&attempt, claimed).await
                },
                Err(outcome) => *outcome,
            },
            ClaimDecision::DeadLetter { record, expected } => match self.claim(record, expected).await {
                Ok(dead) => {
                    let error = dead.last_error.clone().unwrap_or_else(|| {
                        LifecycleError::new(
                            ErrorCode::TransportFailure,
                            ErrorStage::Claim,
                            "retry bound reached",
                        )
                    });
                    warn!(
                        fingerprint = %fingerprint,
                        attempt = dead.attempt_count,
                        error_code = %error.code,
                        "Retry bound reached; dead-lettering"
                    );
                    self.send_dead_letter(&envelope, Some(&fingerprint), Some(&target_table), &error, dead.attempt_count)
                        .await;
                    self.send_event(&dead, attempt.elapsed_secs()).await;
                    Outcome::from_record(Disposition::Failed, &dead)
                },
                Err(outcome) => *outcome,
            },
        }
    }

    async fn fetch(&self, envelope: &DeliveryEnvelope) -> Result<Vec<u8>, LifecycleError> {
        let bytes = match tokio::time::timeout(self.io_timeout(), self.landing.fetch(&envelope.source_location)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                return Err(LifecycleError::new(ErrorCode::TransportFailure, ErrorStage::Fetch, format!("{:#}", e)));
            },
            Err(_) => {
                return Err(LifecycleError::new(
                    ErrorCode::Timeout,
                    ErrorStage::Fetch,
                    format!("fetch exceeded {}s", self.ingest.io_timeout_secs),
                ));
            },
        };

        if let Some(declared) = envelope.declared_size_bytes {
            if declared != bytes.len() as u64 {
                return Err(LifecycleError::new(
                    ErrorCode::TransportFailure,
                    ErrorStage::Fetch,
                    format!("declared {} bytes but fetched {}", declared, bytes.len()),
                ));
            }
        }

        Ok(bytes)
    }

    /// Run a store call under the I/O bound, mapping failures into the taxonomy
    async fn store_call<T, F>(&self, stage: ErrorStage, call: F) -> Result<T, LifecycleError>
    where
        F: Future<Output = crate::lifecycle::StoreResult<T>>,
    {
        match tokio::time::timeout(self.io_timeout(), call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(backend = self.store.backend(), "Lifecycle store failed: {}", e);
                Err(LifecycleError::new(ErrorCode::StoreFailure, stage, e.to_string()))
            },
            Err(_) => Err(LifecycleError::new(
                ErrorCode::Timeout,
                stage,
                format!("lifecycle store call exceeded {}s", self.ingest.io_timeout_secs),
            )),
        }
    }

    /// Conditionally write `record`. A lost race yields the winner's outcome.
    async fn claim(
        &self,
        record: FileLifecycleRecord,
        expected: Expected,
    ) -> Result<FileLifecycleRecord, Box<Outcome>> {
        self.write(record, expected, ErrorStage::Claim).await
    }

    async fn write(
        &self,
        record: FileLifecycleRecord,
        expected: Expected,
        stage: ErrorStage,
    ) -> Result<FileLifecycleRecord, Box<Outcome>> {
        let fingerprint = record.fingerprint.clone();
        let target_table = record.target_table.clone();

        match self.store_call(stage, self.store.put(&record, expected)).await {
            Ok(PutOutcome::Written(written)) => {
                debug!(fingerprint = %fingerprint, status = %written.status, version = written.version, "Lifecycle write");
                Ok(written)
            },
            Ok(PutOutcome::Contended(Some(winner))) => {
                info!(
                    fingerprint = %fingerprint,
                    status = %winner.status,
                    "Lost conditional write; reporting winner's outcome"
                );
                Err(Box::new(Outcome::observed(&winner)))
            },
            Ok(PutOutcome::Contended(None)) => Err(Box::new(Outcome::unrecorded(
                Disposition::Failed,
                Some(fingerprint),
                Some(target_table),
                LifecycleError::new(ErrorCode::StoreContention, stage, "record disappeared during write"),
            ))),
            Err(error) => Err(Box::new(Outcome::unrecorded(
                Disposition::Failed,
                Some(fingerprint),
                Some(target_table),
                error,
            ))),
        }
    }

    /// Move `record` to `status` with `error`, then publish the transition
    async fn record_failure(
        &self,
        attempt: &Attempt<'_>,
        record: &FileLifecycleRecord,
        status: LifecycleStatus,
        error: LifecycleError,
    ) -> Outcome {
        let mut failed = match transition(record, status, Utc::now()) {
            Ok(failed) => failed,
            Err(e) => {
                error!(fingerprint = %record.fingerprint, "{}", e);
                return Outcome::from_record(Disposition::Failed, record);
            },
        };
        failed.last_error = Some(error.clone());

        warn!(
            fingerprint = %record.fingerprint,
            target_table = %record.target_table,
            attempt = record.attempt_count,
            status = %status,
            error_code = %error.code,
            stage = %error.stage,
            "Attempt failed: {}",
            error.message
        );

        let failed = match self.write(failed, record.expectation(), error.stage).await {
            Ok(failed) => failed,
            Err(outcome) => return *outcome,
        };
        self.send_event(&failed, attempt.elapsed_secs()).await;

        let exhausted = failed.attempt_count >= self.ingest.max_attempts;
        if !error.code.is_retryable() || exhausted {
            return self.dead_letter(attempt, &failed, &error).await;
        }

        Outcome::from_record(Disposition::Failed, &failed)
    }

    async fn dead_letter(
        &self,
        attempt: &Attempt<'_>,
        record: &FileLifecycleRecord,
        error: &LifecycleError,
    ) -> Outcome {
        let dead = match transition(record, LifecycleStatus::DeadLettered, Utc::now()) {
            Ok(dead) => dead,
            Err(e) => {
                error!(fingerprint = %record.fingerprint, "{}", e);
                return Outcome::from_record(Disposition::Failed, record);
            },
        };
        let dead = match self.write(dead, record.expectation(), error.stage).await {
            Ok(dead) => dead,
            Err(outcome) => return *outcome,
        };

        self.send_dead_letter(
            attempt.envelope,
            Some(&dead.fingerprint),
            Some(attempt.target_table),
            error,
            dead.attempt_count,
        )
        .await;
        self.send_event(&dead, attempt.elapsed_secs()).await;

        Outcome::from_record(Disposition::Failed, &dead)
    }

    async fn repair_and_stage(
        &self,
        attempt: &Attempt<'_>,
        claimed: FileLifecycleRecord,
        bytes: Vec<u8>,
    ) -> Outcome {
        let result = match self.run_repair(attempt, &claimed, bytes).await {
            Ok(result) => result,
            Err(error) => {
                return self
                    .record_failure(attempt, &claimed, LifecycleStatus::RepairFailed, error)
                    .await;
            },
        };

        info!(
            fingerprint = %claimed.fingerprint,
            target_table = %claimed.target_table,
            rows_raw = result.row_count_raw,
            rows_repaired = result.row_count_repaired,
            duplicates = result.duplicate_rows(),
            "Repair succeeded"
        );

        let path = artifact_path(
            &self.ingest.staging_prefix,
            &claimed.target_table,
            claimed.fingerprint.as_str(),
            claimed.attempt_count,
            uuid::Uuid::new_v4(),
        );
        let artifact_ref = match tokio::time::timeout(self.io_timeout(), self.artifacts.put(&path, result.artifact)).await {
            Ok(Ok(reference)) => reference,
            Ok(Err(e)) => {
                let error = LifecycleError::new(ErrorCode::TransportFailure, ErrorStage::Staging, format!("{:#}", e));
                return self
                    .record_failure(attempt, &claimed, LifecycleStatus::RepairFailed, error)
                    .await;
            },
            Err(_) => {
                let error = LifecycleError::new(
                    ErrorCode::Timeout,
                    ErrorStage::Staging,
                    format!("staging write exceeded {}s", self.ingest.io_timeout_secs),
                );
                return self
                    .record_failure(attempt, &claimed, LifecycleStatus::RepairFailed, error)
                    .await;
            },
        };

        let mut succeeded = match transition(&claimed, LifecycleStatus::RepairSucceeded, Utc::now()) {
            Ok(succeeded) => succeeded,
            Err(e) => {
                error!(fingerprint = %claimed.fingerprint, "{}", e);
                return Outcome::from_record(Disposition::Failed, &claimed);
            },
        };
        succeeded.row_count_raw = Some(result.row_count_raw as u64);
        succeeded.row_count_repaired = Some(result.row_count_repaired as u64);
        succeeded.schema = Some(result.schema);
        succeeded.artifact_ref = Some(artifact_ref);
        succeeded.last_error = None;

        let succeeded = match self.write(succeeded, claimed.expectation(), ErrorStage::Staging).await {
            Ok(succeeded) => succeeded,
            Err(outcome) => return *outcome,
        };

        self.hand_off(attempt, succeeded).await
    }

    /// Run the repair pipeline on a blocking thread under the repair bound
    async fn run_repair(
        &self,
        attempt: &Attempt<'_>,
        claimed: &FileLifecycleRecord,
        bytes: Vec<u8>,
    ) -> Result<RepairResult, LifecycleError> {
        let mut ctx = RepairContext::new(self.repair.clone(), processed_at(claimed));
        if let Some(keys) = self.ingest.primary_keys.get(&claimed.target_table) {
            ctx = ctx.with_primary_keys(keys.clone());
        }
        if let Some(classifier) = &self.classifier {
            ctx = ctx.with_classifier(Arc::clone(classifier));
        }

        let file_name = attempt.envelope.file_name().to_string();
        let task = tokio::task::spawn_blocking(move || repair(&ctx, &file_name, &bytes));
        let bound = self.ingest.repair_timeout_secs;

        match tokio::time::timeout(Duration::from_secs(bound), task).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(e))) => Err(e.to_lifecycle_error()),
            Ok(Err(join_error)) => Err(LifecycleError::new(
                ErrorCode::UnsupportedFormat,
                ErrorStage::Load,
                format!("repair task aborted: {}", join_error),
            )),
            Err(_) => Err(LifecycleError::new(
                ErrorCode::Timeout,
                ErrorStage::Load,
                format!("repair exceeded {}s", bound),
            )),
        }
    }

    /// Publish the hand-off for a `REPAIR_SUCCEEDED` record
    async fn hand_off(&self, attempt: &Attempt<'_>, record: FileLifecycleRecord) -> Outcome {
        let Some(artifact_ref) = record.artifact_ref.clone() else {
            let error = LifecycleError::new(
                ErrorCode::StoreFailure,
                ErrorStage::Handoff,
                "repaired record has no artifact reference",
            );
            return self.dead_letter(attempt, &record, &error).await;
        };

        let message = HandoffMessage {
            message_type: LOAD_REQUEST.to_string(),
            fingerprint: record.fingerprint.clone(),
            original_location: record.source_location.clone(),
            artifact_ref,
            target_namespace: self.ingest.target_namespace.clone(),
            target_table: record.target_table.clone(),
            write_mode: self.ingest.write_mode,
            upsert_keys: self.ingest.upsert_keys.clone(),
            row_count: record.row_count_repaired.unwrap_or_default(),
            schema: record.schema.clone().unwrap_or_default(),
            published_at: Utc::now(),
        };

        let published = match tokio::time::timeout(self.io_timeout(), self.publisher.publish_handoff(&message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(LifecycleError::new(ErrorCode::TransportFailure, ErrorStage::Handoff, format!("{:#}", e))),
            Err(_) => Err(LifecycleError::new(
                ErrorCode::Timeout,
                ErrorStage::Handoff,
                format!("hand-off publish exceeded {}s", self.ingest.io_timeout_secs),
            )),
        };

        if let Err(error) = published {
            return self
                .record_failure(attempt, &record, LifecycleStatus::HandoffFailed, error)
                .await;
        }

        let mut done = match transition(&record, LifecycleStatus::HandoffSucceeded, Utc::now()) {
            Ok(done) => done,
            Err(e) => {
                error!(fingerprint = %record.fingerprint, "{}", e);
                return Outcome::from_record(Disposition::Failed, &record);
            },
        };
        done.last_error = None;
        let done = match self.write(done, record.expectation(), ErrorStage::Handoff).await {
            Ok(done) => done,
            Err(outcome) => return *outcome,
        };

        info!(
            fingerprint = %done.fingerprint,
            target_table = %done.target_table,
            attempt = done.attempt_count,
            duration_seconds = attempt.elapsed_secs(),
            "Hand-off succeeded"
        );
        self.send_event(&done, attempt.elapsed_secs()).await;

        Outcome::from_record(Disposition::Completed, &done)
    }

    async fn send_event(&self, record: &FileLifecycleRecord, duration_seconds: f64) {
        let event = LifecycleEvent {
            message_type: LIFECYCLE_EVENT.to_string(),
            fingerprint: record.fingerprint.clone(),
            target_table: record.target_table.clone(),
            status: record.status,
            error_code: record.last_error.as_ref().map(|e| e.code),
            error_stage: record.last_error.as_ref().map(|e| e.stage),
            error_message: record.last_error.as_ref().map(|e| e.message.clone()),
            attempt_count: record.attempt_count,
            duration_seconds,
            timestamp: Utc::now(),
        };

        match tokio::time::timeout(self.io_timeout(), self.publisher.publish_event(&event)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => warn!(fingerprint = %record.fingerprint, "Lifecycle event publish failed: {:#}", e),
            Err(_) => warn!(fingerprint = %record.fingerprint, "Lifecycle event publish timed out"),
        }
    }

    async fn send_dead_letter(
        &self,
        envelope: &DeliveryEnvelope,
        fingerprint: Option<&FileFingerprint>,
        target_table: Option<&str>,
        error: &LifecycleError,
        attempt_count: u32,
    ) {
        let letter = DeadLetter {
            message_type: DEAD_LETTER.to_string(),
            envelope: envelope.clone(),
            fingerprint: fingerprint.cloned(),
            target_table: target_table.map(str::to_string),
            code: error.code,
            stage: error.stage,
            message: error.message.clone(),
            attempt_count,
            dead_lettered_at: Utc::now(),
        };

        match tokio::time::timeout(self.io_timeout(), self.publisher.publish_dead_letter(&letter)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => error!(source_location = %envelope.source_location, "Dead-letter publish failed: {:#}", e),
            Err(_) => error!(source_location = %envelope.source_location, "Dead-letter publish timed out"),
        }
    }
}

/// Provenance timestamp of an attempt: the claim time, truncated to
/// microseconds so the parquet column matches the record.
fn processed_at(claimed: &FileLifecycleRecord) -> DateTime<Utc> {
    use chrono::DurationRound;
    claimed
        .updated_at
        .duration_trunc(chrono::Duration::microseconds(1))
        .unwrap_or(claimed.updated_at)
}
