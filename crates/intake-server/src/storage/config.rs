use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Default bucket holding landed files and staged artifacts.
pub const DEFAULT_S3_BUCKET: &str = "intake-data";

/// Default S3 region.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Default root directory for the local staging backend.
pub const DEFAULT_STAGING_ROOT: &str = "./data";

/// Where landed files are read from and artifacts are written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingBackend {
    S3,
    Local,
}

impl std::str::FromStr for StagingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" | "minio" => Ok(StagingBackend::S3),
            "local" | "fs" | "file" => Ok(StagingBackend::Local),
            _ => Err(anyhow::anyhow!("Invalid staging backend: {}", s)),
        }
    }
}

/// S3-compatible object storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Static credentials; the default AWS provider chain is used when unset
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_S3_REGION.to_string(),
            bucket: DEFAULT_S3_BUCKET.to_string(),
            access_key: None,
            secret_key: None,
            path_style: false,
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| DEFAULT_S3_REGION.to_string()),
            bucket: env::var("S3_BUCKET").unwrap_or_else(|_| DEFAULT_S3_BUCKET.to_string()),
            access_key: env::var("S3_ACCESS_KEY").ok(),
            secret_key: env::var("S3_SECRET_KEY").ok(),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_S3_REGION.to_string(),
            bucket: bucket.into(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
        }
    }
}

/// Staging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    pub backend: StagingBackend,
    /// Root directory for the local backend
    pub root: PathBuf,
    pub s3: StorageConfig,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            backend: StagingBackend::Local,
            root: PathBuf::from(DEFAULT_STAGING_ROOT),
            s3: StorageConfig::default(),
        }
    }
}

impl StagingConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            backend: env::var("STAGING_BACKEND")
                .ok()
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or(StagingBackend::Local),
            root: env::var("STAGING_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_STAGING_ROOT)),
            s3: StorageConfig::from_env(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_for_minio() {
        let config = StorageConfig::for_minio("http://localhost:9000", "test-bucket");
        assert_eq!(config.endpoint, Some("http://localhost:9000".to_string()));
        assert_eq!(config.bucket, "test-bucket");
        assert!(config.path_style);
        assert_eq!(config.access_key.as_deref(), Some("minioadmin"));
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("S3".parse::<StagingBackend>().unwrap(), StagingBackend::S3);
        assert_eq!("local".parse::<StagingBackend>().unwrap(), StagingBackend::Local);
        assert!("gcs".parse::<StagingBackend>().is_err());
    }
}
