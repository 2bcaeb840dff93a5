//! Origin fetchers
//!
//! A fetcher performs the slow, idempotent lookup behind a cache miss. It
//! never fails outward: failures come back as a descriptive string and are
//! cached like any other value.

use crate::common::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, key: &str) -> String;
}

/// Placeholder stored when the origin answered but its body could not be read
pub const BODY_READ_FAILURE: &str = "Internal server error";

/// Prefix of the placeholder stored when the origin could not be reached
pub const FETCH_FAILURE_PREFIX: &str = "fetch failed: ";

/// Treats each key as a URL and issues a GET against it.
///
/// The response body is drained but not kept; the cached value is the URL.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stampede/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, key: &str) -> String {
        tracing::info!(url = %key, "Fetching from origin");

        let response = match self.client.get(key).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %key, error = %e, "Origin fetch failed");
                return format!("{}{}", FETCH_FAILURE_PREFIX, e);
            }
        };

        match response.bytes().await {
            Ok(body) => {
                tracing::debug!(url = %key, bytes = body.len(), "Origin body read");
                key.to_string()
            }
            Err(e) => {
                tracing::warn!(url = %key, error = %e, "Failed to read origin body");
                BODY_READ_FAILURE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_origin_becomes_placeholder() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
        // Port 9 (discard) on localhost is closed in test environments
        let value = fetcher.fetch("http://127.0.0.1:9/").await;
        assert!(value.starts_with(FETCH_FAILURE_PREFIX), "got {}", value);
    }

    #[tokio::test]
    async fn test_invalid_url_becomes_placeholder() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
        let value = fetcher.fetch("not a url").await;
        assert!(value.starts_with(FETCH_FAILURE_PREFIX), "got {}", value);
    }
}
