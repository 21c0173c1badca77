//! Shared fixtures for the server integration tests

#![allow(dead_code)]

use intake_server::config::IngestConfig;
use intake_server::handoff::RecordingPublisher;
use intake_server::lifecycle::MemoryLifecycleStore;
use intake_server::storage::MemoryStorage;
use intake_server::Orchestrator;
use std::sync::Arc;

/// Orchestrator wired to in-memory collaborators that tests can inspect
pub struct Harness {
    pub store: Arc<MemoryLifecycleStore>,
    pub storage: Arc<MemoryStorage>,
    pub publisher: Arc<RecordingPublisher>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_ingest(IngestConfig::default())
    }

    pub fn with_ingest(ingest: IngestConfig) -> Self {
        Self::build(ingest, |orchestrator| orchestrator)
    }

    /// Harness whose orchestrator is further configured by `configure`
    pub fn build(ingest: IngestConfig, configure: impl FnOnce(Orchestrator) -> Orchestrator) -> Self {
        let store = Arc::new(MemoryLifecycleStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let orchestrator = Orchestrator::new(
            store.clone(),
            storage.clone(),
            storage.clone(),
            publisher.clone(),
        )
        .with_ingest_config(ingest);
        let orchestrator = configure(orchestrator);

        Self {
            store,
            storage,
            publisher,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Land `content` at `location` and return the envelope announcing it
    pub fn land(&self, location: &str, content: &str) -> intake_server::DeliveryEnvelope {
        self.storage.insert(location, content);
        intake_server::DeliveryEnvelope::new(location).with_size(content.len() as u64)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("intake_server=debug")
        .with_test_writer()
        .try_init();
}

/// Header plus `rows` well-formed order lines
pub fn orders_file(rows: usize) -> String {
    let mut text = String::from("Order ID,Customer,Amount,Shipped\n");
    for i in 1..=rows {
        text.push_str(&format!("{:05},customer {},{}.50,{}\n", i, i % 3, i * 10, i % 2 == 0));
    }
    text
}

/// 100 data rows where row 50 opens a quote that only closes, malformed, on row 53
pub fn misquoted_file() -> String {
    let mut text = String::from("id,note\n");
    for i in 1..=100 {
        match i {
            50 => text.push_str("50,\"unclosed note\n"),
            53 => text.push_str("53,closing note\" here\n"),
            _ => text.push_str(&format!("{},note {}\n", i, i)),
        }
    }
    text
}
