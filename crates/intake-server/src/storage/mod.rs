//! Landing source and artifact staging
//!
//! Landed files are read through [`LandingSource`]; repaired artifacts are
//! written through [`ArtifactStore`]. Artifact writes are write-once: every
//! attempt gets a fresh path and an existing object is never replaced.

use anyhow::Result;
use async_trait::async_trait;

pub mod config;
pub mod local;
pub mod memory;
pub mod s3;

pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use s3::S3Storage;

/// Read access to landed files
#[async_trait]
pub trait LandingSource: Send + Sync {
    /// Fetch the full content at `location`
    async fn fetch(&self, location: &str) -> Result<Vec<u8>>;
}

/// Write-once artifact staging
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` at `path` and return a reference to the stored object.
    ///
    /// Fails if an object already exists at `path`.
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<String>;
}

/// Build the staging path of one attempt's artifact
pub fn artifact_path(
    staging_prefix: &str,
    target_table: &str,
    fingerprint: &str,
    attempt: u32,
    nonce: uuid::Uuid,
) -> String {
    let prefix = staging_prefix.trim_matches('/');
    let name = format!("{}/{}/attempt-{}-{}.parquet", target_table, fingerprint, attempt, nonce);
    if prefix.is_empty() {
        name
    } else {
        format!("{}/{}", prefix, name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path() {
        let nonce = uuid::Uuid::nil();
        assert_eq!(
            artifact_path("staging/", "orders", "ab12", 2, nonce),
            "staging/orders/ab12/attempt-2-00000000-0000-0000-0000-000000000000.parquet"
        );
        assert_eq!(
            artifact_path("", "orders", "ab12", 1, nonce),
            "orders/ab12/attempt-1-00000000-0000-0000-0000-000000000000.parquet"
        );
    }
}
