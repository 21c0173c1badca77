//! Intake Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Delivery intake for landed data files: content identity, the per-file
//! lifecycle, repair, staging and hand-off.
//!
//! # Overview
//!
//! - **Lifecycle**: per-fingerprint records behind a conditional-write store
//!   (in-memory or PostgreSQL) and a pure state machine over them
//! - **Orchestrator**: one delivery attempt from envelope to hand-off; safe to
//!   invoke any number of times for the same file
//! - **Storage**: landing reads and write-once artifact staging (S3-compatible,
//!   local filesystem, in-memory)
//! - **Hand-off**: load requests, lifecycle events and dead letters (HTTP,
//!   log-only, recording)
//! - **API**: `POST /deliveries`, `GET /files/:fingerprint`, `GET /health`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use intake_server::envelope::DeliveryEnvelope;
//! use intake_server::handoff::LogPublisher;
//! use intake_server::lifecycle::MemoryLifecycleStore;
//! use intake_server::orchestrator::Orchestrator;
//! use intake_server::storage::LocalStorage;
//!
//! # async fn run() {
//! let storage = Arc::new(LocalStorage::new("./data"));
//! let orchestrator = Orchestrator::new(
//!     Arc::new(MemoryLifecycleStore::new()),
//!     storage.clone(),
//!     storage,
//!     Arc::new(LogPublisher),
//! );
//! let outcome = orchestrator
//!     .process(DeliveryEnvelope::new("landing/orders/2025-01-15.csv"))
//!     .await;
//! println!("{:?}", outcome.status);
//! # }
//! ```

pub mod api;
pub mod classifier;
pub mod config;
pub mod envelope;
pub mod error;
pub mod handoff;
pub mod lifecycle;
pub mod orchestrator;
pub mod storage;

pub use config::Config;
pub use envelope::DeliveryEnvelope;
pub use error::{AppError, AppResult};
pub use orchestrator::{Disposition, Orchestrator, Outcome};
