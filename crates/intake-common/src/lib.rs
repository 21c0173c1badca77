//! Intake Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, fingerprinting, and error handling for the intake workspace.
//!
//! # Overview
//!
//! - **Fingerprints**: content-addressed file identity ([`FileFingerprint`])
//! - **Error Handling**: the failure taxonomy recorded on lifecycle records
//! - **Logging**: `tracing` subscriber setup shared by all binaries
//! - **Types**: column schema types shared by the repair engine and the server
//!
//! # Example
//!
//! ```no_run
//! use intake_common::fingerprint::FileFingerprint;
//!
//! let a = FileFingerprint::of(b"id,name\n1,alice\n");
//! let b = FileFingerprint::of(b"id,name\n1,alice\n");
//! assert_eq!(a, b);
//! ```

pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{ErrorCode, ErrorStage, IntakeError, LifecycleError, Result};
pub use fingerprint::FileFingerprint;
pub use types::{ColumnSchema, ColumnType};
