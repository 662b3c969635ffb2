//! Chunk asset fetching
//!
//! Worker detection needs the raw text of a chunk's asset. [`HttpFetcher`]
//! downloads it over HTTP(S); [`MemoryFetcher`] serves canned bodies.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::config::FetchConfig;

/// Source of chunk asset text
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch the body of `url` as text
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Fetches assets over HTTP(S)
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher from the `[fetch]` config section
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch_text(&self, url: &str) -> Result<String> {
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            bail!("Failed to fetch {}: HTTP {}", url, response.status());
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))
    }
}

/// Serves asset bodies from memory, keyed by full URL
#[derive(Default)]
pub struct MemoryFetcher {
    bodies: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`
    pub fn with_body(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }

    /// Every requested URL, in request order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AssetFetcher for MemoryFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.requests.lock().push(url.to_string());
        tokio::task::yield_now().await;

        match self.bodies.get(url) {
            Some(body) => Ok(body.clone()),
            None => bail!("Failed to fetch {}: HTTP 404 Not Found", url),
        }
    }
}

/// Whether an asset body is a web-worker bundle
pub fn is_worker_asset(body: &str, marker: &str) -> bool {
    body.contains(marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_marker() {
        let worker = r#"(()=>{importScripts("/assets/a.js");self.onmessage=()=>{}})()"#;
        let bundle = r#"(this.webpackChunk=this.webpackChunk||[]).push([[12],{}])"#;

        assert!(is_worker_asset(worker, "importScripts("));
        assert!(!is_worker_asset(bundle, "importScripts("));
    }

    #[tokio::test]
    async fn test_memory_fetcher_missing_url() {
        let fetcher = MemoryFetcher::new().with_body("/assets/a.js", "x");

        assert_eq!(fetcher.fetch_text("/assets/a.js").await.unwrap(), "x");
        assert!(fetcher.fetch_text("/assets/b.js").await.is_err());
        assert_eq!(fetcher.requests(), vec!["/assets/a.js", "/assets/b.js"]);
    }
}
