use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::{DeadLetter, HandoffMessage, LifecycleEvent, LogPublisher, Publisher};

/// Endpoints of the HTTP publisher; an absent endpoint falls back to logging
#[derive(Debug, Clone, Default)]
pub struct HttpPublisherConfig {
    pub handoff_url: Option<String>,
    pub events_url: Option<String>,
    pub dead_letter_url: Option<String>,
    pub timeout_secs: u64,
}

/// Publisher that POSTs JSON messages to configured endpoints
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    client: Client,
    config: HttpPublisherConfig,
    fallback: LogPublisher,
}

impl HttpPublisher {
    pub fn new(config: HttpPublisherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("intake-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            config,
            fallback: LogPublisher,
        })
    }

    async fn post<T: Serialize + Sync>(&self, url: &str, body: &T) -> Result<()> {
        debug!("POST {}", url);
        self.client
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?
            .error_for_status()
            .with_context(|| format!("{} rejected the message", url))?;
        Ok(())
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish_handoff(&self, message: &HandoffMessage) -> Result<()> {
        match &self.config.handoff_url {
            Some(url) => self.post(url, message).await,
            None => self.fallback.publish_handoff(message).await,
        }
    }

    async fn publish_event(&self, event: &LifecycleEvent) -> Result<()> {
        match &self.config.events_url {
            Some(url) => self.post(url, event).await,
            None => self.fallback.publish_event(event).await,
        }
    }

    async fn publish_dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        match &self.config.dead_letter_url {
            Some(url) => self.post(url, letter).await,
            None => self.fallback.publish_dead_letter(letter).await,
        }
    }
}
