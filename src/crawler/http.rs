//! HTTP page source
//!
//! Loads pages with reqwest. Redirects are followed by the client, so a
//! listing that bounces to a login or challenge page surfaces as address
//! drift in the `RetryingFetcher`.

use crate::config::HttpConfig;
use crate::crawler::fetcher::{Page, PageSource, SourceError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The HTTP configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use paged_harvest::config::HttpConfig;
/// use paged_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let timeout = Duration::from_secs(config.timeout_secs);

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `PageSource` backed by a reqwest client
pub struct HttpPageSource {
    config: HttpConfig,
    client: Option<Client>,
}

impl HttpPageSource {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            config: config.clone(),
            client: Some(build_http_client(config)?),
        })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn navigate(&mut self, address: &str) -> Result<Page, SourceError> {
        let client = self.client.as_ref().ok_or(SourceError::Closed)?;

        let response = client.get(address).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Network(format!("Request timeout: {}", address))
            } else if e.is_connect() {
                SourceError::Network(format!("Connection refused: {}", address))
            } else {
                SourceError::Http(e)
            }
        })?;

        let status = response.status();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response.text().await?;
        let ready = status.is_success() && (content_type.is_empty() || content_type.contains("html"));

        if !ready {
            tracing::debug!(
                "{} answered {} with content type '{}'",
                final_url,
                status,
                content_type
            );
        }

        Ok(Page {
            address: final_url,
            ready,
            status: Some(status.as_u16()),
            body,
        })
    }

    async fn refresh(&mut self) -> Result<(), SourceError> {
        self.client = Some(build_http_client(&self.config)?);
        Ok(())
    }

    async fn close(&mut self) {
        self.client = None;
    }
}
