//! Scripted test doubles for the pipeline's two network edges.
//!
//! [`MockFetcher`] and [`MockProvider`] record every call, which is what
//! makes the pipeline's observable properties checkable: "blocked hosts
//! issue zero fetches", "404 is not retried", "fallback happened after
//! exactly N primary attempts". Both are ordinary implementations of the
//! public traits, so they plug in through
//! [`PipelineConfig`](crate::PipelineConfig) like any production handle.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::pipeline::fetch::{FetchError, FetchedPage, PageFetcher};
use crate::provider::{GenerationProvider, GenerationRequest, ProviderError, ProviderResponse};

/// A fetcher that serves scripted responses and counts calls.
///
/// Responses for a URL are consumed in order; the final response repeats for
/// any further calls. Fetching a URL with no script fails with a connection
/// error, so a test can't silently hit an unexpected endpoint.
#[derive(Default)]
pub struct MockFetcher {
    routes: RwLock<HashMap<String, VecDeque<Result<FetchedPage, FetchError>>>>,
    calls: RwLock<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a URL (builder form).
    pub fn with_response(self, url: &str, response: Result<FetchedPage, FetchError>) -> Self {
        self.stub(url, response);
        self
    }

    /// Queue a successful page for a URL (builder form).
    pub fn with_page(self, url: &str, page: FetchedPage) -> Self {
        self.stub(url, Ok(page));
        self
    }

    /// Queue a response for a URL.
    pub fn stub(&self, url: &str, response: Result<FetchedPage, FetchError>) {
        self.routes
            .write()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Total fetch calls across all URLs.
    pub fn fetch_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Fetch calls made for one URL.
    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.read().unwrap().iter().filter(|u| *u == url).count()
    }

    /// Every URL fetched, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.calls.write().unwrap().push(url.to_string());

        let mut routes = self.routes.write().unwrap();
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or(Err(FetchError::Connect(format!("no stub for {url}")))),
            None => Err(FetchError::Connect(format!("no stub for {url}"))),
        }
    }
}

/// A provider that serves scripted results and counts calls.
///
/// Results are consumed in order; running past the script is a hard API
/// error so over-calling shows up as a test failure instead of a hang.
pub struct MockProvider {
    name: String,
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Queue one result (builder form).
    pub fn with_result(self, result: Result<ProviderResponse, ProviderError>) -> Self {
        self.push(result);
        self
    }

    /// Queue a successful text response (builder form).
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.push(Ok(response(text)));
        self
    }

    /// Queue `n` copies of a transient error (builder form).
    pub fn with_transient_failures(self, n: usize) -> Self {
        for _ in 0..n {
            self.push(Err(ProviderError::Api {
                status: 503,
                message: "scripted transient failure".into(),
            }));
        }
        self
    }

    /// Queue one result.
    pub fn push(&self, result: Result<ProviderResponse, ProviderError>) {
        self.script.lock().unwrap().push_back(result);
    }

    /// Number of completion calls made against this provider.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request this provider saw, for prompt assertions.
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().unwrap().clone()
    }

    /// Wrap into the `Arc<dyn …>` form the config expects.
    pub fn into_handle(self) -> Arc<dyn GenerationProvider> {
        Arc::new(self)
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ProviderError::Api {
                status: 500,
                message: "mock script exhausted".into(),
            }))
    }
}

/// A successful provider response with plausible token accounting.
pub fn response(text: impl Into<String>) -> ProviderResponse {
    let text = text.into();
    ProviderResponse {
        input_tokens: 120,
        output_tokens: (text.len() / 4) as u64,
        text,
    }
}

/// A valid generated-cards JSON body with `count` distinct cards.
pub fn cards_json(topic_title: &str, count: usize) -> String {
    let cards: Vec<String> = (1..=count)
        .map(|i| {
            format!(
                r#"{{"title": "Concept {i}", "content": "A thorough, self-contained explanation of concept {i}."}}"#
            )
        })
        .collect();
    format!(
        r#"{{"topic_title": "{topic_title}", "cards": [{}]}}"#,
        cards.join(",")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetcher_consumes_script_then_repeats_last() {
        let fetcher = MockFetcher::new()
            .with_page("https://a/", FetchedPage::new(503, "down", "https://a/"))
            .with_page("https://a/", FetchedPage::new(200, "up", "https://a/"));

        assert_eq!(fetcher.fetch("https://a/").await.unwrap().status, 503);
        assert_eq!(fetcher.fetch("https://a/").await.unwrap().status, 200);
        // Last response repeats.
        assert_eq!(fetcher.fetch("https://a/").await.unwrap().status, 200);
        assert_eq!(fetcher.fetch_count(), 3);
        assert_eq!(fetcher.calls_for("https://a/"), 3);
    }

    #[tokio::test]
    async fn fetcher_rejects_unstubbed_urls() {
        let fetcher = MockFetcher::new();
        assert!(fetcher.fetch("https://unknown/").await.is_err());
        assert_eq!(fetch_count_after(&fetcher), 1);
    }

    fn fetch_count_after(fetcher: &MockFetcher) -> usize {
        fetcher.fetch_count()
    }

    #[tokio::test]
    async fn provider_script_and_counters() {
        let provider = MockProvider::new("mock").with_text("hello");
        let request = GenerationRequest {
            system: "s".into(),
            user: "u".into(),
            images: vec![],
            temperature: 0.7,
            max_tokens: 64,
        };
        let response = provider.complete(&request).await.unwrap();
        assert_eq!(response.text, "hello");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.last_request().unwrap().user, "u");

        // Past the script is a hard error.
        assert!(provider.complete(&request).await.is_err());
    }

    #[test]
    fn cards_json_is_parseable() {
        let raw = cards_json("Topic", 6);
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["cards"].as_array().unwrap().len(), 6);
    }
}
