//! File lifecycle: durable per-fingerprint state with conditional transitions

pub mod machine;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use machine::{decide_claim, transition, ClaimDecision, ClaimRequest, RetryPolicy};
pub use memory::MemoryLifecycleStore;
pub use postgres::PgLifecycleStore;
pub use record::{Expected, FileLifecycleRecord, LifecycleStatus};
pub use store::{LifecycleStore, PutOutcome, StoreError, StoreResult};
