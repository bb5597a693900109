//! Generation providers and the fallback client that drives them.
//!
//! The two providers are implementations of one capability trait,
//! [`GenerationProvider`] — the fallback client holds an ordered list and
//! iterates, no inheritance hierarchy involved. The client owns the retry
//! policy: each provider is attempted up to `max_retries` times with
//! exponential backoff, terminal provider errors skip straight to the next
//! provider, and only when every provider exhausts does the caller see
//! [`PipelineError::AllProvidersExhausted`].
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 5xx / timeouts from LLM APIs are transient and frequent under
//! load. With a 1 s base the wait sequence is 1 s → 2 s → 4 s per provider,
//! and every wait is raced against the caller's cancellation token so an
//! aborted request never schedules another attempt.

mod gemini;
mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::{GenerationOutcome, ProviderRole, TokenUsage};
use crate::retry::{backoff_sleep, with_cancel};

/// A base64-encoded image attachment for a vision request.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Base64 payload (no data-URI prefix).
    pub data: String,
    /// Mime type, e.g. `image/png`.
    pub mime_type: String,
}

/// One fully-parameterised generation request.
///
/// Mode is expressed through the contents: a structured-cards call carries
/// the card prompts and no images; a vision-extract call carries the vision
/// instruction plus image attachments. The client treats both identically.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub images: Vec<EncodedImage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A successful raw response from a provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    /// Zero when the provider does not report usage.
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Errors a single provider call can produce.
///
/// Transient variants are retried by the client; terminal variants move
/// straight to the next provider in the chain.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The HTTP call timed out.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure (DNS, reset, TLS).
    #[error("network error: {detail}")]
    Network { detail: String },

    /// HTTP 429 from the provider.
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// HTTP 401/403 — retrying will not help.
    #[error("authentication failed: {detail}")]
    Auth { detail: String },

    /// Any other non-success status.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// HTTP 200 but no generated text in the body.
    #[error("provider returned an empty response")]
    Empty,

    /// HTTP 200 but the response body did not match the expected shape.
    #[error("unexpected response shape: {detail}")]
    Decode { detail: String },
}

impl ProviderError {
    /// Whether the client should spend retry budget on this error.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout
            | ProviderError::Network { .. }
            | ProviderError::RateLimited { .. }
            | ProviderError::Empty => true,
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::Auth { .. } | ProviderError::Decode { .. } => false,
        }
    }
}

/// One content-generation capability: text in, text out, optional images.
///
/// Implementations wrap a specific provider API and hold nothing but
/// connection handles, so one instance is safe to share across concurrent
/// pipeline invocations.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Short provider name for logs and provenance ("gemini", "openai").
    fn name(&self) -> &str;

    /// Execute one completion call. No retrying here — that is the client's job.
    async fn complete(&self, request: &GenerationRequest) -> Result<ProviderResponse, ProviderError>;
}

/// Classify a non-success HTTP status into a [`ProviderError`].
pub(crate) fn classify_status(
    status: u16,
    retry_after_secs: Option<u64>,
    body: &str,
) -> ProviderError {
    // Bodies can be huge HTML error pages; keep a usable prefix for logs.
    let message: String = body.chars().take(300).collect();
    match status {
        429 => ProviderError::RateLimited { retry_after_secs },
        401 | 403 => ProviderError::Auth { detail: message },
        s => ProviderError::Api { status: s, message },
    }
}

/// Map a reqwest transport error into a [`ProviderError`].
pub(crate) fn classify_transport(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network {
            detail: err.to_string(),
        }
    }
}

/// Drives an ordered provider chain with bounded retries and fallback.
///
/// Holds no state between calls besides the provider handles; share one
/// instance across as many concurrent invocations as you like.
#[derive(Clone)]
pub struct GenerationClient {
    providers: Vec<Arc<dyn GenerationProvider>>,
    max_retries: u32,
    backoff_ms: u64,
}

impl GenerationClient {
    /// Build a client over an explicit provider chain (first is primary).
    pub fn new(providers: Vec<Arc<dyn GenerationProvider>>, max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            providers,
            max_retries: max_retries.max(1),
            backoff_ms,
        }
    }

    /// Resolve providers from the config, falling back to environment keys.
    ///
    /// Resolution order:
    /// 1. an injected chain (`config.providers`) is used as-is;
    /// 2. `GEMINI_API_KEY` builds the primary, `OPENAI_API_KEY` the secondary;
    /// 3. neither present → [`PipelineError::ProviderNotConfigured`].
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        if let Some(providers) = &config.providers {
            return Ok(Self::new(
                providers.clone(),
                config.max_retries,
                config.retry_backoff_ms,
            ));
        }

        let mut providers: Vec<Arc<dyn GenerationProvider>> = Vec::new();
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                providers.push(Arc::new(GeminiProvider::new(
                    key,
                    config.primary_model.clone(),
                    config.provider_timeout_secs,
                )?));
            }
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                providers.push(Arc::new(OpenAiProvider::new(
                    key,
                    config.secondary_model.clone(),
                    config.provider_timeout_secs,
                )?));
            }
        }

        if providers.is_empty() {
            return Err(PipelineError::ProviderNotConfigured {
                hint: "set GEMINI_API_KEY or OPENAI_API_KEY, or inject providers via \
                       PipelineConfig::builder().providers(…)"
                    .into(),
            });
        }

        Ok(Self::new(providers, config.max_retries, config.retry_backoff_ms))
    }

    /// Execute one generation request against the chain.
    ///
    /// Transient errors are retried with exponential backoff up to
    /// `max_retries` per provider; terminal errors skip the remaining budget
    /// and move to the next provider. Every wait and every HTTP call is
    /// abortable through `cancel`.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, PipelineError> {
        let mut last_errors: Vec<(String, String)> = Vec::new();
        let mut primary_attempts = 0u32;
        let mut fallback_attempts = 0u32;

        for (index, provider) in self.providers.iter().enumerate() {
            let role = if index == 0 {
                ProviderRole::Primary
            } else {
                ProviderRole::Secondary
            };
            let mut last_err: Option<ProviderError> = None;

            for attempt in 1..=self.max_retries {
                if attempt > 1 {
                    warn!(
                        provider = provider.name(),
                        attempt,
                        max = self.max_retries,
                        "retrying generation call"
                    );
                    backoff_sleep(self.backoff_ms, attempt - 1, cancel).await?;
                }

                match role {
                    ProviderRole::Primary => primary_attempts += 1,
                    ProviderRole::Secondary => fallback_attempts += 1,
                }

                let start = Instant::now();
                let result = with_cancel(cancel, provider.complete(request)).await?;

                match result {
                    Ok(response) => {
                        let latency_ms = start.elapsed().as_millis() as u64;
                        debug!(
                            provider = provider.name(),
                            attempt,
                            input_tokens = response.input_tokens,
                            output_tokens = response.output_tokens,
                            latency_ms,
                            "generation call succeeded"
                        );
                        return Ok(GenerationOutcome {
                            text: response.text,
                            provider: role,
                            provider_name: provider.name().to_string(),
                            usage: TokenUsage {
                                input_tokens: response.input_tokens,
                                output_tokens: response.output_tokens,
                                latency_ms,
                            },
                            attempts: primary_attempts,
                            fallback_attempts,
                            fallback_used: role == ProviderRole::Secondary,
                        });
                    }
                    Err(e) => {
                        let transient = e.is_transient();
                        warn!(
                            provider = provider.name(),
                            attempt,
                            transient,
                            error = %e,
                            "generation call failed"
                        );
                        last_err = Some(e);
                        if !transient {
                            break;
                        }
                    }
                }
            }

            let detail = last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            last_errors.push((provider.name().to_string(), detail));

            if index + 1 < self.providers.len() {
                warn!(
                    failed = provider.name(),
                    next = self.providers[index + 1].name(),
                    "provider exhausted, falling back"
                );
            }
        }

        let describe = |entry: Option<&(String, String)>| match entry {
            Some((name, detail)) => format!("{name}: {detail}"),
            None => "not configured".to_string(),
        };
        Err(PipelineError::AllProvidersExhausted {
            primary: describe(last_errors.first()),
            secondary: describe(last_errors.get(1)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_provider_errors() {
        assert!(ProviderError::Timeout.is_transient());
        assert!(ProviderError::RateLimited {
            retry_after_secs: Some(30)
        }
        .is_transient());
        assert!(ProviderError::Api {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());
        assert!(ProviderError::Empty.is_transient());

        assert!(!ProviderError::Auth {
            detail: "bad key".into()
        }
        .is_transient());
        assert!(!ProviderError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(429, Some(60), ""),
            ProviderError::RateLimited {
                retry_after_secs: Some(60)
            }
        ));
        assert!(matches!(
            classify_status(401, None, "invalid key"),
            ProviderError::Auth { .. }
        ));
        assert!(matches!(
            classify_status(500, None, "oops"),
            ProviderError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn classify_status_truncates_huge_bodies() {
        let body = "x".repeat(10_000);
        if let ProviderError::Api { message, .. } = classify_status(502, None, &body) {
            assert!(message.chars().count() <= 300);
        } else {
            panic!("expected Api error");
        }
    }
}
