//! Delivery orchestration tests
//!
//! These run the full attempt (fetch, claim, repair, stage, hand-off) against
//! in-memory collaborators and check the lifecycle record, the staged
//! artifacts and the published messages.

mod common;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::{init_tracing, misquoted_file, orders_file, Harness};
use intake_common::{ErrorCode, ErrorStage, FileFingerprint};
use intake_repair::HeaderClassifier;
use intake_server::config::IngestConfig;
use intake_server::handoff::{RecordingPublisher, WriteMode};
use intake_server::lifecycle::{
    Expected, FileLifecycleRecord, LifecycleStatus, LifecycleStore, MemoryLifecycleStore,
    PutOutcome, StoreResult,
};
use intake_server::storage::{LandingSource, MemoryStorage};
use intake_server::{DeliveryEnvelope, Disposition, Orchestrator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_first_delivery_completes() -> Result<()> {
    init_tracing();
    let h = Harness::new();
    let content = orders_file(10);
    let envelope = h.land("landing/Orders/2025-01-15.csv", &content);

    let outcome = h.orchestrator.process(envelope).await;

    assert_eq!(outcome.disposition, Disposition::Completed);
    assert_eq!(outcome.status, Some(LifecycleStatus::HandoffSucceeded));
    assert_eq!(outcome.fingerprint, Some(FileFingerprint::of(content.as_bytes())));
    assert_eq!(outcome.target_table.as_deref(), Some("orders"));
    assert_eq!(outcome.row_count_repaired, Some(10));
    assert_eq!(outcome.attempt_count, Some(1));
    assert!(outcome.error.is_none());

    let handoffs = h.publisher.handoffs();
    assert_eq!(handoffs.len(), 1);
    let message = &handoffs[0];
    assert_eq!(message.message_type, "LOAD_REQUEST");
    assert_eq!(message.target_namespace, "bronze");
    assert_eq!(message.target_table, "orders");
    assert_eq!(message.write_mode, WriteMode::Append);
    assert_eq!(message.row_count, 10);
    assert_eq!(message.original_location, "landing/Orders/2025-01-15.csv");
    assert_eq!(Some(&message.artifact_ref), outcome.artifact_ref.as_ref());

    let names: Vec<&str> = message.schema.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["order_id", "customer", "amount", "shipped", "is_duplicate", "processed_at"]);

    // Artifact staged once, under the table and fingerprint
    assert_eq!(h.storage.put_count(), 1);
    let fp = FileFingerprint::of(content.as_bytes());
    let path = message.artifact_ref.trim_start_matches("memory://");
    assert!(path.starts_with(&format!("staging/orders/{}/attempt-1-", fp)));
    assert!(h.storage.get(path).is_some_and(|bytes| bytes.starts_with(b"PAR1")));

    let record = h.store.get(&fp).await?.expect("record");
    assert_eq!(record.status, LifecycleStatus::HandoffSucceeded);
    assert_eq!(record.row_count_raw, Some(10));
    assert_eq!(record.row_count_repaired, Some(10));
    assert!(record.schema.is_some());

    let statuses: Vec<LifecycleStatus> = h.publisher.events().iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![LifecycleStatus::HandoffSucceeded]);
    Ok(())
}

#[tokio::test]
async fn test_sequential_replays_publish_once() -> Result<()> {
    let h = Harness::new();
    let envelope = h.land("landing/orders/a.csv", &orders_file(5));

    let first = h.orchestrator.process(envelope.clone()).await;
    let second = h.orchestrator.process(envelope.clone()).await;
    let third = h.orchestrator.process(envelope).await;

    assert_eq!(first.disposition, Disposition::Completed);
    for replay in [&second, &third] {
        assert_eq!(replay.disposition, Disposition::Duplicate);
        assert_eq!(replay.status, first.status);
        assert_eq!(replay.artifact_ref, first.artifact_ref);
        assert_eq!(replay.attempt_count, Some(1));
    }
    assert_eq!(h.publisher.handoffs().len(), 1);
    assert_eq!(h.storage.put_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replays_publish_once() -> Result<()> {
    let h = Harness::new();
    let envelope = h.land("landing/orders/burst.csv", &orders_file(50));

    let attempts = (0..8).map(|_| {
        let orchestrator = h.orchestrator.clone();
        let envelope = envelope.clone();
        tokio::spawn(async move { orchestrator.process(envelope).await })
    });
    let outcomes: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .collect::<Result<_, _>>()?;

    let completed = outcomes
        .iter()
        .filter(|o| o.disposition == Disposition::Completed)
        .count();
    assert_eq!(completed, 1);
    assert!(outcomes.iter().all(|o| matches!(
        o.disposition,
        Disposition::Completed | Disposition::InFlight | Disposition::Duplicate
    )));

    assert_eq!(h.publisher.handoffs().len(), 1);
    assert_eq!(h.storage.put_count(), 1);

    let fp = FileFingerprint::of(orders_file(50).as_bytes());
    let record = h.store.get(&fp).await?.expect("record");
    assert_eq!(record.status, LifecycleStatus::HandoffSucceeded);
    assert_eq!(record.attempt_count, 1);
    Ok(())
}

#[tokio::test]
async fn test_renamed_reupload_an_hour_later_is_a_duplicate() -> Result<()> {
    let h = Harness::new();
    let content = orders_file(10);

    let first = h.orchestrator.process(h.land("landing/orders/morning.csv", &content)).await;
    assert_eq!(first.disposition, Disposition::Completed);

    // Age the stored record by an hour
    let fp = FileFingerprint::of(content.as_bytes());
    let stored = h.store.get(&fp).await?.expect("record");
    let aged = stored.next(stored.status, Utc::now() - Duration::hours(1));
    assert!(h.store.put(&aged, stored.expectation()).await?.is_written());

    let second = h.orchestrator.process(h.land("landing/orders/copy of morning.csv", &content)).await;

    assert_eq!(second.disposition, Disposition::Duplicate);
    assert_eq!(second.status, Some(LifecycleStatus::HandoffSucceeded));
    assert_eq!(second.row_count_repaired, first.row_count_repaired);
    assert_eq!(second.row_count_repaired, Some(10));
    assert_eq!(h.publisher.handoffs().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_row_loss_records_repair_failure_without_artifact() -> Result<()> {
    let h = Harness::new();
    let content = misquoted_file();
    let outcome = h.orchestrator.process(h.land("landing/notes/n.csv", &content)).await;

    assert_eq!(outcome.disposition, Disposition::Failed);
    assert_eq!(outcome.status, Some(LifecycleStatus::RepairFailed));
    assert_eq!(outcome.attempt_count, Some(1));
    let error = outcome.error.expect("error");
    assert_eq!(error.code, ErrorCode::RowLossDetected);
    assert_eq!(error.stage, ErrorStage::Load);

    assert_eq!(h.storage.put_count(), 0);
    assert!(h.publisher.handoffs().is_empty());
    assert!(h.publisher.dead_letters().is_empty());

    let record = h.store.get(&FileFingerprint::of(content.as_bytes())).await?.expect("record");
    assert_eq!(record.status, LifecycleStatus::RepairFailed);
    assert!(record.artifact_ref.is_none());

    let events = h.publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, LifecycleStatus::RepairFailed);
    assert_eq!(events[0].error_code, Some(ErrorCode::RowLossDetected));
    Ok(())
}

#[tokio::test]
async fn test_retryable_failure_dead_letters_at_attempt_bound() -> Result<()> {
    let h = Harness::new();
    let envelope = h.land("landing/notes/n.csv", &misquoted_file());

    h.orchestrator.process(envelope.clone()).await;
    let second = h.orchestrator.process(envelope.clone()).await;
    assert_eq!(second.status, Some(LifecycleStatus::RepairFailed));
    assert_eq!(second.attempt_count, Some(2));

    let third = h.orchestrator.process(envelope.clone()).await;
    assert_eq!(third.status, Some(LifecycleStatus::DeadLettered));
    assert_eq!(third.attempt_count, Some(3));
    assert_eq!(third.error.as_ref().map(|e| e.code), Some(ErrorCode::RowLossDetected));

    let letters = h.publisher.dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].code, ErrorCode::RowLossDetected);
    assert_eq!(letters[0].attempt_count, 3);
    assert_eq!(letters[0].envelope, envelope);

    // Terminal: further deliveries do nothing
    let fourth = h.orchestrator.process(envelope).await;
    assert_eq!(fourth.disposition, Disposition::Duplicate);
    assert_eq!(fourth.attempt_count, Some(3));
    assert_eq!(h.publisher.dead_letters().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_non_retryable_failure_dead_letters_immediately() -> Result<()> {
    let h = Harness::new();
    let outcome = h.orchestrator.process(h.land("landing/orders/blank.csv", "  \n\n ")).await;

    assert_eq!(outcome.status, Some(LifecycleStatus::DeadLettered));
    assert_eq!(outcome.attempt_count, Some(1));
    assert_eq!(outcome.error.as_ref().map(|e| e.code), Some(ErrorCode::EmptyFile));

    let statuses: Vec<LifecycleStatus> = h.publisher.events().iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![LifecycleStatus::RepairFailed, LifecycleStatus::DeadLettered]);

    let letters = h.publisher.dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].code, ErrorCode::EmptyFile);
    assert_eq!(letters[0].target_table.as_deref(), Some("orders"));
    assert!(letters[0].fingerprint.is_some());
    Ok(())
}

#[tokio::test]
async fn test_handoff_retry_reuses_staged_artifact() -> Result<()> {
    let h = Harness::new();
    h.publisher.fail_next_handoffs(1);
    let envelope = h.land("landing/orders/a.csv", &orders_file(4));

    let first = h.orchestrator.process(envelope.clone()).await;
    assert_eq!(first.disposition, Disposition::Failed);
    assert_eq!(first.status, Some(LifecycleStatus::HandoffFailed));
    let error = first.error.as_ref().expect("error");
    assert_eq!(error.code, ErrorCode::TransportFailure);
    assert_eq!(error.stage, ErrorStage::Handoff);
    assert_eq!(h.storage.put_count(), 1);

    let second = h.orchestrator.process(envelope).await;
    assert_eq!(second.disposition, Disposition::Completed);
    assert_eq!(second.status, Some(LifecycleStatus::HandoffSucceeded));
    assert_eq!(second.attempt_count, Some(2));
    assert_eq!(second.artifact_ref, first.artifact_ref);
    assert!(second.error.is_none());

    // No second repair: still a single staged artifact
    assert_eq!(h.storage.put_count(), 1);
    assert_eq!(h.publisher.handoffs().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_staging_failure_is_retryable() -> Result<()> {
    let h = Harness::new();
    h.storage.fail_next_puts(1);
    let envelope = h.land("landing/orders/a.csv", &orders_file(3));

    let first = h.orchestrator.process(envelope.clone()).await;
    assert_eq!(first.status, Some(LifecycleStatus::RepairFailed));
    let error = first.error.expect("error");
    assert_eq!(error.code, ErrorCode::TransportFailure);
    assert_eq!(error.stage, ErrorStage::Staging);

    let second = h.orchestrator.process(envelope).await;
    assert_eq!(second.disposition, Disposition::Completed);
    assert_eq!(second.attempt_count, Some(2));
    let artifact = second.artifact_ref.expect("artifact");
    assert!(artifact.contains("/attempt-2-"));
    Ok(())
}

#[tokio::test]
async fn test_stale_claim_is_reclaimed() -> Result<()> {
    let h = Harness::new();
    let content = orders_file(6);
    let fp = FileFingerprint::of(content.as_bytes());

    // A worker claimed this file two hours ago and vanished
    let abandoned = FileLifecycleRecord::claimed(
        fp,
        "orders",
        "landing/orders/a.csv",
        Utc::now() - Duration::hours(2),
    );
    assert!(h.store.put(&abandoned, Expected::Absent).await?.is_written());

    let outcome = h.orchestrator.process(h.land("landing/orders/a.csv", &content)).await;

    assert_eq!(outcome.disposition, Disposition::Completed);
    assert_eq!(outcome.attempt_count, Some(2));
    assert_eq!(h.publisher.handoffs().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_live_claim_is_left_alone() -> Result<()> {
    let h = Harness::new();
    let content = orders_file(6);
    let fp = FileFingerprint::of(content.as_bytes());

    let live = FileLifecycleRecord::claimed(fp.clone(), "orders", "landing/orders/a.csv", Utc::now());
    assert!(h.store.put(&live, Expected::Absent).await?.is_written());

    let outcome = h.orchestrator.process(h.land("landing/orders/a.csv", &content)).await;

    assert_eq!(outcome.disposition, Disposition::InFlight);
    assert_eq!(outcome.status, Some(LifecycleStatus::Claimed));
    assert_eq!(h.storage.put_count(), 0);
    assert!(h.publisher.handoffs().is_empty());
    assert_eq!(h.store.get(&fp).await?.expect("record").version, 1);
    Ok(())
}

#[tokio::test]
async fn test_ungrouped_upload_is_rejected_and_dead_lettered() -> Result<()> {
    let h = Harness::new();
    let outcome = h.orchestrator.process(h.land("landing/loose.csv", "id\n1\n")).await;

    assert_eq!(outcome.disposition, Disposition::Rejected);
    assert_eq!(outcome.status, None);
    let error = outcome.error.expect("error");
    assert_eq!(error.code, ErrorCode::InvalidPath);

    assert!(h.store.is_empty());
    assert_eq!(h.storage.fetch_count(), 0);

    let letters = h.publisher.dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].code, ErrorCode::InvalidPath);
    assert!(letters[0].fingerprint.is_none());
    Ok(())
}

#[tokio::test]
async fn test_directory_markers_are_ignored() -> Result<()> {
    let h = Harness::new();
    for location in ["landing/orders/", "landing/orders/.keep"] {
        let outcome = h.orchestrator.process(DeliveryEnvelope::new(location)).await;
        assert_eq!(outcome.disposition, Disposition::Rejected);
        assert_eq!(outcome.error.map(|e| e.code), Some(ErrorCode::InvalidEnvelope));
    }
    assert!(h.store.is_empty());
    assert!(h.publisher.dead_letters().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_size_mismatch_writes_no_record() -> Result<()> {
    let h = Harness::new();
    let envelope = h.land("landing/orders/a.csv", &orders_file(2)).with_size(3);

    let outcome = h.orchestrator.process(envelope).await;

    assert_eq!(outcome.disposition, Disposition::Failed);
    assert_eq!(outcome.status, None);
    let error = outcome.error.expect("error");
    assert_eq!(error.code, ErrorCode::TransportFailure);
    assert_eq!(error.stage, ErrorStage::Fetch);
    assert!(h.store.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_missing_landed_file_writes_no_record() -> Result<()> {
    let h = Harness::new();
    let outcome = h.orchestrator.process(DeliveryEnvelope::new("landing/orders/gone.csv")).await;

    assert_eq!(outcome.disposition, Disposition::Failed);
    assert_eq!(outcome.error.map(|e| e.code), Some(ErrorCode::TransportFailure));
    assert!(h.store.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_upsert_handoff_carries_keys() -> Result<()> {
    let h = Harness::with_ingest(IngestConfig {
        write_mode: WriteMode::Upsert,
        upsert_keys: vec!["order_id".to_string()],
        target_namespace: "raw".to_string(),
        ..IngestConfig::default()
    });

    let outcome = h.orchestrator.process(h.land("landing/orders/a.csv", &orders_file(2))).await;
    assert!(outcome.is_success());

    let handoffs = h.publisher.handoffs();
    assert_eq!(handoffs[0].write_mode, WriteMode::Upsert);
    assert_eq!(handoffs[0].upsert_keys, vec!["order_id"]);
    assert_eq!(handoffs[0].target_namespace, "raw");
    Ok(())
}

#[tokio::test]
async fn test_json_lines_delivery() -> Result<()> {
    let h = Harness::new();
    let content = "{\"id\": 1, \"name\": \"a\"}\n{\"id\": 2, \"name\": \"b\"}\n";
    let outcome = h.orchestrator.process(h.land("landing/events/batch.jsonl", content)).await;

    assert_eq!(outcome.disposition, Disposition::Completed);
    assert_eq!(outcome.target_table.as_deref(), Some("events"));
    assert_eq!(outcome.row_count_repaired, Some(2));
    Ok(())
}

/// Classifier that takes longer than the repair bound allows
struct StalledClassifier(std::time::Duration);

impl HeaderClassifier for StalledClassifier {
    fn classify_header(&self, _sample_rows: &[Vec<String>]) -> anyhow::Result<bool> {
        std::thread::sleep(self.0);
        Ok(true)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_repair_timeout_is_recorded_and_counts_toward_bound() -> Result<()> {
    let h = Harness::build(
        IngestConfig {
            repair_timeout_secs: 1,
            max_attempts: 2,
            ..IngestConfig::default()
        },
        |orchestrator| {
            orchestrator.with_classifier(Arc::new(StalledClassifier(std::time::Duration::from_secs(2))))
        },
    );
    let content = "alpha,beta\ngamma,delta\nepsilon,zeta\n";
    let envelope = h.land("landing/words/w.csv", content);

    let first = h.orchestrator.process(envelope.clone()).await;
    assert_eq!(first.disposition, Disposition::Failed);
    assert_eq!(first.status, Some(LifecycleStatus::RepairFailed));
    assert_eq!(first.attempt_count, Some(1));
    let error = first.error.expect("error");
    assert_eq!(error.code, ErrorCode::Timeout);
    assert_eq!(error.stage, ErrorStage::Load);
    assert!(error.code.is_retryable());

    let fp = FileFingerprint::of(content.as_bytes());
    let record = h.store.get(&fp).await?.expect("record");
    assert_eq!(record.status, LifecycleStatus::RepairFailed);
    assert_eq!(record.attempt_count, 1);
    assert!(record.artifact_ref.is_none());
    assert_eq!(h.storage.put_count(), 0);

    let events = h.publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, LifecycleStatus::RepairFailed);
    assert_eq!(events[0].error_code, Some(ErrorCode::Timeout));
    assert_eq!(events[0].attempt_count, 1);

    // The second timeout reaches the bound
    let second = h.orchestrator.process(envelope).await;
    assert_eq!(second.status, Some(LifecycleStatus::DeadLettered));
    assert_eq!(second.attempt_count, Some(2));
    let letters = h.publisher.dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].code, ErrorCode::Timeout);
    assert_eq!(letters[0].attempt_count, 2);
    Ok(())
}

/// Landing source that answers slower than the I/O bound
struct SlowLanding {
    inner: Arc<MemoryStorage>,
    delay: std::time::Duration,
}

#[async_trait]
impl LandingSource for SlowLanding {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch(location).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_writes_no_record() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let content = orders_file(2);
    storage.insert("landing/orders/a.csv", content.as_str());

    let store = Arc::new(MemoryLifecycleStore::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let landing = Arc::new(SlowLanding {
        inner: storage.clone(),
        delay: std::time::Duration::from_secs(30),
    });
    let orchestrator = Orchestrator::new(store.clone(), landing, storage.clone(), publisher.clone())
        .with_ingest_config(IngestConfig {
            io_timeout_secs: 1,
            ..IngestConfig::default()
        });

    let outcome = orchestrator.process(DeliveryEnvelope::new("landing/orders/a.csv")).await;

    assert_eq!(outcome.disposition, Disposition::Failed);
    assert_eq!(outcome.status, None);
    assert_eq!(outcome.fingerprint, None);
    let error = outcome.error.expect("error");
    assert_eq!(error.code, ErrorCode::Timeout);
    assert_eq!(error.stage, ErrorStage::Fetch);
    assert!(store.is_empty());
    assert!(publisher.events().is_empty());
    Ok(())
}

/// Store where another worker finishes the file while this attempt repairs.
///
/// Just before the first `REPAIR_SUCCEEDED` write lands, the stored claim is
/// advanced to `HANDOFF_SUCCEEDED` as a competing worker would leave it.
struct SupersededStore {
    inner: MemoryLifecycleStore,
    superseded: AtomicBool,
    outcomes: Mutex<Vec<PutOutcome>>,
}

#[async_trait]
impl LifecycleStore for SupersededStore {
    async fn get(&self, fingerprint: &FileFingerprint) -> StoreResult<Option<FileLifecycleRecord>> {
        self.inner.get(fingerprint).await
    }

    async fn put(&self, record: &FileLifecycleRecord, expected: Expected) -> StoreResult<PutOutcome> {
        if record.status == LifecycleStatus::RepairSucceeded && !self.superseded.swap(true, Ordering::SeqCst) {
            if let Some(claimed) = self.inner.get(&record.fingerprint).await? {
                let mut winner = claimed.next(LifecycleStatus::HandoffSucceeded, Utc::now());
                winner.artifact_ref = Some("memory://staging/winner.parquet".to_string());
                winner.row_count_raw = Some(3);
                winner.row_count_repaired = Some(3);
                self.inner.put(&winner, claimed.expectation()).await?;
            }
        }

        let outcome = self.inner.put(record, expected).await?;
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push(outcome.clone());
        }
        Ok(outcome)
    }

    fn backend(&self) -> &'static str {
        "superseded"
    }
}

#[tokio::test]
async fn test_superseded_attempt_reports_winner_without_handoff() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let content = orders_file(3);
    storage.insert("landing/orders/a.csv", content.as_str());

    let store = Arc::new(SupersededStore {
        inner: MemoryLifecycleStore::new(),
        superseded: AtomicBool::new(false),
        outcomes: Mutex::new(Vec::new()),
    });
    let publisher = Arc::new(RecordingPublisher::new());
    let orchestrator = Orchestrator::new(store.clone(), storage.clone(), storage.clone(), publisher.clone());

    let outcome = orchestrator.process(DeliveryEnvelope::new("landing/orders/a.csv")).await;

    assert_eq!(outcome.disposition, Disposition::Duplicate);
    assert_eq!(outcome.status, Some(LifecycleStatus::HandoffSucceeded));
    assert_eq!(outcome.artifact_ref.as_deref(), Some("memory://staging/winner.parquet"));

    // Claim written, completion lost to the winner
    let outcomes = store.outcomes.lock().map(|o| o.clone()).unwrap_or_default();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].is_written());
    match &outcomes[1] {
        PutOutcome::Contended(Some(current)) => {
            assert_eq!(current.status, LifecycleStatus::HandoffSucceeded);
        },
        other => panic!("expected contended completion, got {other:?}"),
    }

    let fp = FileFingerprint::of(content.as_bytes());
    let stored = store.get(&fp).await?.expect("record");
    assert_eq!(stored.status, LifecycleStatus::HandoffSucceeded);
    assert_eq!(stored.artifact_ref.as_deref(), Some("memory://staging/winner.parquet"));

    // The stale attempt published nothing; its own artifact is an orphan
    assert!(publisher.handoffs().is_empty());
    assert!(publisher.events().is_empty());
    assert_eq!(storage.put_count(), 1);
    Ok(())
}
