//! Intake Repair - repair a single file offline

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use intake_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use intake_common::FileFingerprint;
use intake_repair::{repair, RepairConfig, RepairContext, StaticHeaderClassifier};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "intake-repair")]
#[command(author, version, about = "Repair a landed file into a typed parquet artifact")]
struct Cli {
    /// File to repair
    input: PathBuf,

    /// Output parquet file (defaults to <input>.parquet)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Primary-key column used for duplicate identity (repeatable)
    #[arg(long = "primary-key")]
    primary_keys: Vec<String>,

    /// Header answer when the heuristic cannot decide
    #[arg(long)]
    assume_header: Option<bool>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Console)
        .log_file_prefix("intake-repair")
        .build();
    let log_config = log_config.merge_env()?;
    init_logging(&log_config)?;

    let bytes = std::fs::read(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let fingerprint = FileFingerprint::of(&bytes);
    let file_name = cli
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let config = RepairConfig::from_env();
    config.validate()?;

    let mut ctx = RepairContext::new(config, Utc::now()).with_primary_keys(cli.primary_keys);
    if let Some(has_header) = cli.assume_header {
        ctx = ctx.with_classifier(Arc::new(StaticHeaderClassifier::new(has_header)));
    }

    info!(file = %file_name, fingerprint = %fingerprint, "Repairing file");
    let result = repair(&ctx, &file_name, &bytes)
        .map_err(|e| anyhow::anyhow!(e.to_lifecycle_error().to_string()))?;

    let output = cli
        .output
        .unwrap_or_else(|| cli.input.with_extension("parquet"));
    std::fs::write(&output, &result.artifact)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let summary = serde_json::json!({
        "fingerprint": fingerprint,
        "output": output.display().to_string(),
        "summary": result.summary(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    info!("Repair complete");
    Ok(())
}
