//! Fetch transport used by the cache
//!
//! The cache only needs "give me the body for this URL". [`Transport`] is that
//! capability; [`HttpTransport`] provides it over HTTP with reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use thiserror::Error;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur while fetching a URL
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    /// URL is relative and no base URL is configured, or cannot be joined
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Source of raw response bodies
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `url` and returns the response body as text
    async fn fetch(&self, url: &str) -> Result<String, TransportError>;
}

/// Settings for [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base that relative URLs such as `/api/people` are joined onto
    pub base_url: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP transport built on reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Option<Url>,
}

impl HttpTransport {
    /// Creates a transport from the given configuration
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()?;

        let base_url = match config.base_url {
            Some(base) => Some(Url::parse(&base).map_err(|e| TransportError::InvalidUrl {
                url: base.clone(),
                reason: e.to_string(),
            })?),
            None => None,
        };

        Ok(Self { client, base_url })
    }

    /// Resolves `url` against the configured base URL
    ///
    /// Absolute URLs are used as-is. Relative URLs require a base URL.
    pub fn resolve_url(&self, url: &str) -> Result<Url, TransportError> {
        if let Ok(absolute) = Url::parse(url) {
            return Ok(absolute);
        }

        let base = self.base_url.as_ref().ok_or_else(|| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: "relative URL without a configured base URL".to_string(),
        })?;
        base.join(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<String, TransportError> {
        let target = self.resolve_url(url)?;
        tracing::debug!(url, resolved = %target, "sending request");

        let response = self.client.get(target).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}
