//! Delivery envelopes and target-table resolution

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use intake_common::{ErrorCode, ErrorStage, LifecycleError};
use intake_repair::normalize::normalize_column_name;
use serde::{Deserialize, Serialize};

/// Notification that a file has landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEnvelope {
    pub source_location: String,
    #[serde(default)]
    pub declared_size_bytes: Option<u64>,
    #[serde(default)]
    pub arrival_timestamp: Option<DateTime<Utc>>,
}

impl DeliveryEnvelope {
    pub fn new(source_location: impl Into<String>) -> Self {
        Self {
            source_location: source_location.into(),
            declared_size_bytes: None,
            arrival_timestamp: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.declared_size_bytes = Some(size);
        self
    }

    pub fn with_arrival(mut self, at: DateTime<Utc>) -> Self {
        self.arrival_timestamp = Some(at);
        self
    }

    /// Reject envelopes that cannot name a landed file
    pub fn validate(&self) -> Result<(), LifecycleError> {
        let location = self.source_location.trim();
        if location.is_empty() {
            return Err(invalid_envelope("source location is empty"));
        }
        if location.ends_with('/') {
            return Err(invalid_envelope(format!("{} is a directory marker", location)));
        }
        let basename = location.rsplit('/').next().unwrap_or(location);
        if basename.starts_with('.') {
            return Err(invalid_envelope(format!("{} is a hidden object", location)));
        }
        Ok(())
    }

    /// Basename of the landed object, used for format detection
    pub fn file_name(&self) -> &str {
        self.source_location
            .rsplit('/')
            .next()
            .unwrap_or(&self.source_location)
    }
}

fn invalid_envelope(message: impl Into<String>) -> LifecycleError {
    LifecycleError::new(ErrorCode::InvalidEnvelope, ErrorStage::Validation, message)
}

/// Push-subscription wrapper whose `message.data` is a base64 JSON payload
#[derive(Debug, Clone, Deserialize)]
pub struct PushRequest {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub data: String,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Object-store notification carried inside a push message
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectNotification {
    #[serde(default)]
    pub bucket: Option<String>,
    pub name: String,
    /// Object stores report sizes as strings
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
}

impl From<ObjectNotification> for DeliveryEnvelope {
    fn from(n: ObjectNotification) -> Self {
        let source_location = match n.bucket {
            Some(bucket) => format!("s3://{}/{}", bucket, n.name),
            None => n.name,
        };
        Self {
            source_location,
            declared_size_bytes: n.size.and_then(|s| s.parse().ok()),
            arrival_timestamp: n.time_created,
        }
    }
}

/// Accepted request bodies on the delivery endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DeliveryRequest {
    Envelope(DeliveryEnvelope),
    Push(PushRequest),
}

impl DeliveryRequest {
    pub fn into_envelope(self) -> Result<DeliveryEnvelope, LifecycleError> {
        match self {
            DeliveryRequest::Envelope(envelope) => Ok(envelope),
            DeliveryRequest::Push(push) => decode_push(&push.message.data),
        }
    }
}

fn decode_push(data: &str) -> Result<DeliveryEnvelope, LifecycleError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| invalid_envelope(format!("message data is not base64: {}", e)))?;

    if let Ok(envelope) = serde_json::from_slice::<DeliveryEnvelope>(&bytes) {
        return Ok(envelope);
    }
    serde_json::from_slice::<ObjectNotification>(&bytes)
        .map(DeliveryEnvelope::from)
        .map_err(|e| invalid_envelope(format!("message data is not a delivery: {}", e)))
}

/// Resolve the target table from the first path segment below the landing
/// prefix.
///
/// `s3://bucket/` and `file://` prefixes are stripped before the landing
/// prefix. A file outside the landing prefix, or directly under its root,
/// has no table.
pub fn resolve_target_table(location: &str, landing_prefix: &str) -> Result<String, LifecycleError> {
    let path = if let Some(rest) = location.strip_prefix("s3://") {
        rest.split_once('/').map(|(_, key)| key).unwrap_or("")
    } else {
        location.strip_prefix("file://").unwrap_or(location)
    };
    let path = path.trim_start_matches('/');

    let prefix = landing_prefix.trim_matches('/');
    let relative = if prefix.is_empty() {
        path
    } else {
        match path.strip_prefix(prefix) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
            _ => {
                return Err(LifecycleError::new(
                    ErrorCode::InvalidPath,
                    ErrorStage::Validation,
                    format!("{} is outside the landing prefix {}", location, prefix),
                ));
            },
        }
    };

    let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return Err(LifecycleError::new(
            ErrorCode::InvalidPath,
            ErrorStage::Validation,
            format!("{} is not under a table folder", location),
        ));
    }

    Ok(normalize_column_name(segments[0]))
}
