use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

use super::config::StorageConfig;
use super::{ArtifactStore, LandingSource};

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        debug!(
            bucket = %config.bucket,
            endpoint = ?config.endpoint,
            region = %config.region,
            "Initializing S3 storage"
        );

        let mut s3_config_builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials = Credentials::new(access_key, secret_key, None, None, "intake-storage");
                aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials)
            },
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        s3_config_builder = s3_config_builder
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("Storage client initialized for bucket: {}", config.bucket);

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    /// Split a location into bucket and key.
    ///
    /// `s3://bucket/key` names its own bucket; anything else is a key in the
    /// configured bucket.
    pub fn resolve<'a>(&'a self, location: &'a str) -> Result<(&'a str, &'a str)> {
        match location.strip_prefix("s3://") {
            Some(rest) => {
                let (bucket, key) = rest
                    .split_once('/')
                    .ok_or_else(|| anyhow!("S3 location has no key: {}", location))?;
                Ok((bucket, key))
            },
            None => Ok((self.bucket.as_str(), location.trim_start_matches('/'))),
        }
    }
}

#[async_trait]
impl LandingSource for S3Storage {
    #[instrument(skip(self))]
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let (bucket, key) = self.resolve(location)?;
        debug!("Downloading from s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .context(format!("Failed to download from S3: {}", location))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);

        Ok(data)
    }
}

#[async_trait]
impl ArtifactStore for S3Storage {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        let key = path.trim_start_matches('/');
        debug!("Uploading {} bytes to s3://{}/{}", bytes.len(), self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/vnd.apache.parquet")
            // Conditional create: fails with 412 if the key already exists
            .if_none_match("*")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .context("Failed to upload to S3")?;

        let reference = format!("s3://{}/{}", self.bucket, key);
        info!("Successfully uploaded {}", reference);

        Ok(reference)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn storage() -> S3Storage {
        S3Storage {
            client: Client::from_conf(
                aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .build(),
            ),
            bucket: "landing".to_string(),
        }
    }

    #[test]
    fn test_resolve_locations() {
        let storage = storage();
        assert_eq!(storage.resolve("s3://other/orders/a.csv").unwrap(), ("other", "orders/a.csv"));
        assert_eq!(storage.resolve("/orders/a.csv").unwrap(), ("landing", "orders/a.csv"));
        assert!(storage.resolve("s3://bucket-only").is_err());
    }
}
