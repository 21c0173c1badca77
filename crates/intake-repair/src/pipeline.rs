//! The repair pipeline: detect, load, normalize, coerce, flag, stamp, export
//!
//! Every attempt runs with an explicit [`RepairContext`]; nothing is shared
//! between attempts. The pipeline is all-or-nothing: any stage failure
//! returns an error and no artifact bytes.

use crate::coerce::{coerce_table, ColumnTypeDecision};
use crate::duplicates::{existing_flags, flag_duplicates, identity_columns};
use crate::error::{RepairError, Result};
use crate::export::to_parquet;
use crate::format::{decode_text, detect_format, FileFormat};
use crate::json::{load_json, JsonShape};
use crate::load::{load_delimited, load_excel, load_parquet, LoadedTable};
use crate::strategy::{select_strategy, HeaderClassifier, ParseStrategy};
use crate::table::{is_protected, ColumnData, RepairedTable, IS_DUPLICATE, PROCESSED_AT};
use chrono::{DateTime, Utc};
use intake_common::ColumnSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default strategy sample size (1 MiB).
pub const DEFAULT_SAMPLE_BYTES: usize = 1024 * 1024;

/// Default maximum share of width-mismatched rows before `PARSE_AMBIGUOUS`.
pub const DEFAULT_MAX_OVERFLOW_RATE: f64 = 0.1;

/// Default number of rows sent to the header classifier.
pub const DEFAULT_HEADER_SAMPLE_ROWS: usize = 3;

/// Default number of delimiters tried.
pub const DEFAULT_MAX_DELIMITER_CANDIDATES: usize = 5;

/// Values treated as missing by coercion (case-insensitive).
pub const DEFAULT_NULL_SENTINELS: [&str; 7] = ["null", "none", "n/a", "na", "nan", "#n/a", "missing"];

/// Tuning for the repair pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    pub sample_bytes: usize,
    pub max_overflow_rate: f64,
    pub header_sample_rows: usize,
    pub max_delimiter_candidates: usize,
    pub null_sentinels: Vec<String>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            sample_bytes: DEFAULT_SAMPLE_BYTES,
            max_overflow_rate: DEFAULT_MAX_OVERFLOW_RATE,
            header_sample_rows: DEFAULT_HEADER_SAMPLE_ROWS,
            max_delimiter_candidates: DEFAULT_MAX_DELIMITER_CANDIDATES,
            null_sentinels: DEFAULT_NULL_SENTINELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RepairConfig {
    /// Load from `REPAIR_*` environment variables, defaulting unset values
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sample_bytes: env_parse("REPAIR_SAMPLE_BYTES").unwrap_or(defaults.sample_bytes),
            max_overflow_rate: env_parse("REPAIR_MAX_OVERFLOW_RATE")
                .unwrap_or(defaults.max_overflow_rate),
            header_sample_rows: env_parse("REPAIR_HEADER_SAMPLE_ROWS")
                .unwrap_or(defaults.header_sample_rows),
            max_delimiter_candidates: env_parse("REPAIR_MAX_DELIMITERS")
                .unwrap_or(defaults.max_delimiter_candidates),
            null_sentinels: std::env::var("REPAIR_NULL_SENTINELS")
                .map(|s| s.split(',').map(|v| v.trim().to_string()).collect())
                .unwrap_or(defaults.null_sentinels),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sample_bytes == 0 {
            anyhow::bail!("Repair sample_bytes must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.max_overflow_rate) {
            anyhow::bail!(
                "Repair max_overflow_rate must be within [0, 1], got {}",
                self.max_overflow_rate
            );
        }
        if self.header_sample_rows == 0 {
            anyhow::bail!("Repair header_sample_rows must be greater than 0");
        }
        if self.max_delimiter_candidates == 0 {
            anyhow::bail!("Repair max_delimiter_candidates must be greater than 0");
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Per-attempt execution context
#[derive(Clone)]
pub struct RepairContext {
    pub config: RepairConfig,
    /// Provenance timestamp stamped on every row of this attempt
    pub processed_at: DateTime<Utc>,
    /// Declared primary-key columns for duplicate identity
    pub primary_keys: Vec<String>,
    pub classifier: Option<Arc<dyn HeaderClassifier>>,
}

impl RepairContext {
    pub fn new(config: RepairConfig, processed_at: DateTime<Utc>) -> Self {
        Self {
            config,
            processed_at,
            primary_keys: Vec::new(),
            classifier: None,
        }
    }

    pub fn with_primary_keys(mut self, keys: Vec<String>) -> Self {
        self.primary_keys = keys;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn HeaderClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }
}

impl std::fmt::Debug for RepairContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairContext")
            .field("config", &self.config)
            .field("processed_at", &self.processed_at)
            .field("primary_keys", &self.primary_keys)
            .field("classifier", &self.classifier.is_some())
            .finish()
    }
}

/// Output of one successful repair attempt
#[derive(Debug, Clone)]
pub struct RepairResult {
    pub table: RepairedTable,
    /// Data records in the source, counted independently of the loader
    pub row_count_raw: usize,
    pub row_count_repaired: usize,
    pub columns_detected: usize,
    pub duplicate_flags: Vec<bool>,
    pub schema: Vec<ColumnSchema>,
    pub type_decisions: Vec<ColumnTypeDecision>,
    pub format: FileFormat,
    pub encoding: Option<&'static str>,
    pub lossy_encoding: bool,
    pub strategy: Option<ParseStrategy>,
    pub json_shape: Option<JsonShape>,
    pub shifted_rows: usize,
    /// Encoded parquet file
    pub artifact: Vec<u8>,
}

/// Serializable digest of a [`RepairResult`]
#[derive(Debug, Clone, Serialize)]
pub struct RepairSummary {
    pub format: FileFormat,
    pub encoding: Option<&'static str>,
    pub lossy_encoding: bool,
    pub strategy: Option<ParseStrategy>,
    pub json_shape: Option<JsonShape>,
    pub row_count_raw: usize,
    pub row_count_repaired: usize,
    pub columns_detected: usize,
    pub duplicate_rows: usize,
    pub shifted_rows: usize,
    pub schema: Vec<ColumnSchema>,
    pub artifact_bytes: usize,
}

impl RepairResult {
    pub fn duplicate_rows(&self) -> usize {
        self.duplicate_flags.iter().filter(|f| **f).count()
    }

    pub fn summary(&self) -> RepairSummary {
        RepairSummary {
            format: self.format,
            encoding: self.encoding,
            lossy_encoding: self.lossy_encoding,
            strategy: self.strategy,
            json_shape: self.json_shape,
            row_count_raw: self.row_count_raw,
            row_count_repaired: self.row_count_repaired,
            columns_detected: self.columns_detected,
            duplicate_rows: self.duplicate_rows(),
            shifted_rows: self.shifted_rows,
            schema: self.schema.clone(),
            artifact_bytes: self.artifact.len(),
        }
    }
}

/// Run the full repair pipeline over one file's bytes.
#[tracing::instrument(skip(ctx, bytes), fields(size = bytes.len()))]
pub fn repair(ctx: &RepairContext, file_name: &str, bytes: &[u8]) -> Result<RepairResult> {
    let format = detect_format(file_name, bytes)?;

    let mut encoding = None;
    let mut lossy_encoding = false;
    let mut strategy = None;
    let mut json_shape = None;

    let loaded: LoadedTable = match format {
        FileFormat::Csv | FileFormat::Tsv => {
            let decoded = decode_text(bytes)?;
            encoding = Some(decoded.encoding);
            lossy_encoding = decoded.lossy;
            let selection = select_strategy(
                &decoded.text,
                format,
                &ctx.config,
                ctx.classifier.as_deref(),
            )?;
            strategy = Some(selection.strategy);
            load_delimited(&decoded.text, &selection.strategy)?
        },
        FileFormat::Json | FileFormat::JsonLines => {
            let decoded = decode_text(bytes)?;
            encoding = Some(decoded.encoding);
            lossy_encoding = decoded.lossy;
            let (loaded, shape) = load_json(&decoded.text)?;
            json_shape = Some(shape);
            loaded
        },
        FileFormat::Parquet => load_parquet(bytes)?,
        FileFormat::Excel => load_excel(bytes)?,
    };

    if loaded.table.row_count() < loaded.source_records {
        return Err(RepairError::RowLoss {
            expected: loaded.source_records,
            loaded: loaded.table.row_count(),
        });
    }

    let columns_detected = loaded
        .table
        .columns
        .iter()
        .filter(|c| !is_protected(c))
        .count();

    let (mut table, type_decisions) = coerce_table(&loaded.table, &ctx.config.null_sentinels)?;

    let duplicate_flags = match table.column(IS_DUPLICATE) {
        Some(existing) => existing_flags(&existing.data),
        None => {
            let keys = identity_columns(&loaded.table, &ctx.primary_keys);
            let flags = flag_duplicates(&loaded.table, &keys);
            table.push(
                IS_DUPLICATE,
                ColumnData::Boolean(flags.iter().map(|f| Some(*f)).collect()),
            );
            flags
        },
    };

    if !table.has_column(PROCESSED_AT) {
        table.push(
            PROCESSED_AT,
            ColumnData::Timestamp(vec![Some(ctx.processed_at); table.row_count()]),
        );
    }

    let artifact = to_parquet(&table)?;

    let result = RepairResult {
        row_count_raw: loaded.source_records,
        row_count_repaired: table.row_count(),
        columns_detected,
        schema: table.schema(),
        duplicate_flags,
        type_decisions,
        format,
        encoding,
        lossy_encoding,
        strategy,
        json_shape,
        shifted_rows: loaded.shifted_rows,
        artifact,
        table,
    };

    tracing::info!(
        format = %result.format,
        row_count_raw = result.row_count_raw,
        row_count_repaired = result.row_count_repaired,
        columns_detected = result.columns_detected,
        duplicate_rows = result.duplicate_rows(),
        shifted_rows = result.shifted_rows,
        "Repair completed"
    );

    Ok(result)
}
