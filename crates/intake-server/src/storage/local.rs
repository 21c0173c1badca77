use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::{ArtifactStore, LandingSource};

/// Filesystem-backed landing source and artifact store
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a location to a path: `file://` and absolute paths are used as
    /// given, anything else is relative to the root.
    pub fn resolve(&self, location: &str) -> PathBuf {
        let location = location.strip_prefix("file://").unwrap_or(location);
        let path = Path::new(location);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl LandingSource for LocalStorage {
    #[instrument(skip(self))]
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.resolve(location);
        let data = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        debug!("Read {} bytes from {}", data.len(), path.display());
        Ok(data)
    }
}

#[async_trait]
impl ArtifactStore for LocalStorage {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        let target = self.root.join(path.trim_start_matches('/'));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .with_context(|| format!("Failed to create {}", target.display()))?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;

        debug!("Wrote {} bytes to {}", bytes.len(), target.display());
        Ok(format!("file://{}", target.display()))
    }
}
