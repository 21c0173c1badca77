//! Intake Repair Engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Turns one landed file into a typed, loss-checked parquet artifact.
//!
//! # Pipeline
//!
//! 1. **Detection**: format from magic bytes and extension, text encoding
//! 2. **Strategy**: delimiter, quote style and header presence for delimited text
//! 3. **Load**: every format into an all-text table, with width repair and a
//!    row-loss guard against an independent record count
//! 4. **Normalize**: snake_case column names, deduplicated
//! 5. **Coerce**: per-column type decision over all values
//! 6. **Duplicates**: intra-file flags in `is_duplicate`
//! 7. **Provenance**: `processed_at` stamped from the attempt context
//! 8. **Export**: deterministic snappy parquet
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use intake_repair::{repair, RepairConfig, RepairContext};
//!
//! # fn main() -> intake_repair::Result<()> {
//! let ctx = RepairContext::new(RepairConfig::default(), Utc::now());
//! let result = repair(&ctx, "orders.csv", b"id,amount\n1,9.50\n")?;
//! assert_eq!(result.row_count_repaired, 1);
//! # Ok(())
//! # }
//! ```

pub mod coerce;
pub mod duplicates;
pub mod error;
pub mod export;
pub mod format;
pub mod json;
pub mod load;
pub mod normalize;
mod patterns;
pub mod pipeline;
pub mod scan;
pub mod strategy;
pub mod table;

pub use error::{RepairError, Result};
pub use format::FileFormat;
pub use pipeline::{repair, RepairConfig, RepairContext, RepairResult, RepairSummary};
pub use strategy::{HeaderClassifier, ParseStrategy, QuoteStyle, StaticHeaderClassifier};
pub use table::{ColumnData, RepairedTable};
