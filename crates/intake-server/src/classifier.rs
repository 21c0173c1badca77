//! Remote header classification

use anyhow::{Context, Result};
use intake_repair::HeaderClassifier;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::runtime::Handle;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyRequest<'a> {
    sample_rows: &'a [Vec<String>],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyResponse {
    has_header: bool,
}

/// Header classifier backed by an HTTP endpoint.
///
/// The repair pipeline is synchronous and runs on a blocking thread, so the
/// request is driven on the runtime handle captured at construction. Must
/// not be called from an async task.
#[derive(Debug, Clone)]
pub struct HttpHeaderClassifier {
    client: Client,
    url: String,
    handle: Handle,
}

impl HttpHeaderClassifier {
    /// Must be called from within a tokio runtime
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let handle = Handle::try_current().context("Header classifier needs a tokio runtime")?;

        Ok(Self {
            client,
            url: url.into(),
            handle,
        })
    }
}

impl HeaderClassifier for HttpHeaderClassifier {
    fn classify_header(&self, sample_rows: &[Vec<String>]) -> Result<bool> {
        let request = ClassifyRequest { sample_rows };
        let response: ClassifyResponse = self.handle.block_on(async {
            self.client
                .post(&self.url)
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json::<ClassifyResponse>()
                .await
        })?;
        Ok(response.has_header)
    }
}
