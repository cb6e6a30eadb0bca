//! Remote source loading.
//!
//! Security model:
//! - Only `http` and `https` URLs are fetched
//! - Optional origin allowlist (empty = any origin)
//! - Redirects are followed a bounded number of times
//! - Anything but a 2xx response is a load failure

use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

const MAX_REDIRECTS: usize = 5;

/// Fetches the text of a remote source file.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

/// Configuration for fetch allowlist
#[derive(Debug, Clone, Default)]
pub struct FetchConfig {
    /// Allowed origins (e.g., "https://cdn.example.com")
    /// An origin is scheme + host + port
    pub allowed_origins: Vec<String>,
}

impl FetchConfig {
    pub fn is_origin_allowed(&self, url: &Url) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        let origin = url.origin().ascii_serialization();
        self.allowed_origins.iter().any(|allowed| origin == *allowed)
    }

    /// Parse `raw` and check it against scheme and origin rules.
    pub fn validate(&self, raw: &str) -> Result<Url, FetchError> {
        let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedScheme(url.scheme().to_string()));
        }

        if !self.is_origin_allowed(&url) {
            return Err(FetchError::OriginNotAllowed(
                url.origin().ascii_serialization(),
            ));
        }

        Ok(url)
    }
}

/// `GET`s sources over HTTP with reqwest.
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch_text(&self, raw: &str) -> Result<String, FetchError> {
        let url = self.config.validate(raw)?;
        debug!(%url, "fetching remote source");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))
    }
}
