//! Page fetching behind a trait.
//!
//! The gate, the transcript strategy, and the encyclopedia strategy all pull
//! resources over HTTP through [`PageFetcher`]. Keeping the network edge
//! behind a trait is what makes the no-fetch and retry-count properties of
//! the gate testable — the scripted mock in [`crate::testing`] counts calls.
//!
//! [`HttpFetcher`] is the production implementation: a shared reqwest client
//! with browser-realistic headers (many sites serve bot user agents a
//! stripped or blocked page), a bounded timeout, and a limited redirect
//! chain. Non-2xx statuses are *not* errors here — classification is the
//! gate's job, so the fetcher reports status and body faithfully.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// A fetched HTTP resource, successful or not.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    /// Lower-cased `Content-Type` header value, when present.
    pub content_type: Option<String>,
    pub body: String,
    /// URL after redirects; login redirects are an auth-wall signal.
    pub final_url: String,
}

impl FetchedPage {
    /// Convenience constructor for tests and fixtures.
    pub fn new(status: u16, body: impl Into<String>, final_url: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("text/html; charset=utf-8".into()),
            body: body.into(),
            final_url: final_url.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into().to_lowercase());
        self
    }
}

/// Transport-level fetch failures. Both variants are transient.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
}

/// The network edge for everything the pipeline reads from the web.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET the URL, following redirects, and report the terminal response.
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Production fetcher backed by a shared reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher from the pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(
            reqwest::header::UPGRADE_INSECURE_REQUESTS,
            reqwest::header::HeaderValue::from_static("1"),
        );

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| PipelineError::InvalidInput {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        tracing::debug!(url, "fetching page");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_lowercase());

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Connect(e.to_string())
            }
        })?;

        tracing::debug!(url, status, bytes = body.len(), "fetch complete");
        Ok(FetchedPage {
            status,
            content_type,
            body,
            final_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetched_page_builder_lowercases_content_type() {
        let page = FetchedPage::new(200, "<html></html>", "https://example.com")
            .with_content_type("Application/PDF");
        assert_eq!(page.content_type.as_deref(), Some("application/pdf"));
    }

    #[test]
    fn http_fetcher_builds_from_default_config() {
        let config = PipelineConfig::default();
        assert!(HttpFetcher::from_config(&config).is_ok());
    }
}
