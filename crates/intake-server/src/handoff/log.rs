use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use super::{DeadLetter, HandoffMessage, LifecycleEvent, Publisher};

/// Publisher that only writes structured log lines
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish_handoff(&self, message: &HandoffMessage) -> Result<()> {
        info!(
            fingerprint = %message.fingerprint,
            target_table = %message.target_table,
            artifact_ref = %message.artifact_ref,
            write_mode = %message.write_mode,
            row_count = message.row_count,
            "Hand-off published"
        );
        Ok(())
    }

    async fn publish_event(&self, event: &LifecycleEvent) -> Result<()> {
        info!(
            fingerprint = %event.fingerprint,
            target_table = %event.target_table,
            status = %event.status,
            error_code = ?event.error_code,
            attempt = event.attempt_count,
            duration_seconds = event.duration_seconds,
            "Lifecycle event"
        );
        Ok(())
    }

    async fn publish_dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        warn!(
            source_location = %letter.envelope.source_location,
            fingerprint = ?letter.fingerprint.as_ref().map(|f| f.as_str()),
            error_code = %letter.code,
            stage = %letter.stage,
            attempt = letter.attempt_count,
            "Dead letter: {}",
            letter.message
        );
        Ok(())
    }
}
