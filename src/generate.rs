//! Pipeline orchestration: the public entry points and the step machine.
//!
//! The run is a deterministic, finite step sequence —
//! `validate → [accessibility check if link] → extract → generate → parse` —
//! implemented as a plain enum-driven loop. Four working states plus the
//! terminal success/failure pair cover it; the only branch is the gate's
//! accessible/not-accessible edge, so a graph engine would buy nothing here.
//!
//! Retry layering is deliberate: the gate and the provider client retry
//! transient failures internally, the orchestrator retries only the extract
//! step, and nothing retries on top of the client — a generation failure has
//! already consumed the full fallback budget. Errors are forwarded exactly
//! as the failing component classified them.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::{CardSet, GenerationOutcome, Provenance};
use crate::pipeline::extract::{self, ExtractionResult};
use crate::pipeline::gate::{validate_url, AccessibilityGate, AccessibilityVerdict};
use crate::pipeline::fetch::{HttpFetcher, PageFetcher};
use crate::pipeline::parse::parse_cards;
use crate::prompts::{card_system_prompt, extracted_user_prompt, text_user_prompt};
use crate::provider::{GenerationClient, GenerationRequest};
use crate::request::{PipelineRequest, SourcePayload, SourceType};
use crate::retry::backoff_sleep;

/// Run the pipeline to completion with a fresh cancellation token.
///
/// This is the primary entry point for the library.
pub async fn generate(
    request: PipelineRequest,
    config: &PipelineConfig,
) -> Result<CardSet, PipelineError> {
    generate_with_cancel(request, config, CancellationToken::new()).await
}

/// Run the pipeline under a caller-supplied cancellation token.
///
/// Cancelling the token aborts in-flight network calls and backoff waits
/// promptly; no retry is scheduled after cancellation.
pub async fn generate_with_cancel(
    request: PipelineRequest,
    config: &PipelineConfig,
    cancel: CancellationToken,
) -> Result<CardSet, PipelineError> {
    let source_type = request.source_type();
    info!(
        source_type = %source_type,
        user_id = request.user_id.as_deref().unwrap_or("-"),
        "pipeline run starting"
    );

    let fetcher = resolve_fetcher(config)?;
    let client = GenerationClient::from_config(config)?;
    let gate = AccessibilityGate::new(Arc::clone(&fetcher), config);

    let runner = Runner {
        request,
        config,
        cancel,
        fetcher,
        client,
        gate,
    };
    runner.run().await
}

/// Blocking wrapper around [`generate`] for synchronous callers.
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    request: PipelineRequest,
    config: &PipelineConfig,
) -> Result<CardSet, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::InvalidInput {
            reason: format!("failed to start async runtime: {e}"),
        })?
        .block_on(generate(request, config))
}

/// Probe a link through the accessibility gate without generating anything.
///
/// Useful for validating a URL at submission time, before spending provider
/// budget on it. Requires no provider configuration.
pub async fn check_link(
    url: &str,
    config: &PipelineConfig,
) -> Result<AccessibilityVerdict, PipelineError> {
    let fetcher = resolve_fetcher(config)?;
    let gate = AccessibilityGate::new(fetcher, config);
    gate.check(url, &CancellationToken::new()).await
}

fn resolve_fetcher(config: &PipelineConfig) -> Result<Arc<dyn PageFetcher>, PipelineError> {
    match &config.fetcher {
        Some(fetcher) => Ok(Arc::clone(fetcher)),
        None => Ok(Arc::new(HttpFetcher::from_config(config)?)),
    }
}

/// The orchestration steps. Each variant owns exactly the data its stage
/// needs, so advancing the machine is a move, not a shared-state mutation.
enum Step {
    Validate,
    CheckAccessibility,
    Extract { gate_html: String },
    Generate { extraction: ExtractionResult },
    Parse {
        extraction: ExtractionResult,
        outcome: GenerationOutcome,
    },
}

struct Runner<'a> {
    request: PipelineRequest,
    config: &'a PipelineConfig,
    cancel: CancellationToken,
    fetcher: Arc<dyn PageFetcher>,
    client: GenerationClient,
    gate: AccessibilityGate,
}

impl Runner<'_> {
    async fn run(self) -> Result<CardSet, PipelineError> {
        let source_type = self.request.source_type();
        let policy = self.config.cards_for(source_type);
        let mut extract_attempts: u32 = 0;
        let mut step = Step::Validate;

        loop {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            step = match step {
                Step::Validate => {
                    self.validate_input()?;
                    match source_type {
                        SourceType::Link => Step::CheckAccessibility,
                        _ => Step::Extract {
                            gate_html: String::new(),
                        },
                    }
                }

                Step::CheckAccessibility => {
                    let SourcePayload::Link { url } = &self.request.source else {
                        return Err(PipelineError::InvalidInput {
                            reason: "accessibility check reached without a link source".into(),
                        });
                    };
                    let passage = self.gate.check_page(url, &self.cancel).await?;
                    debug!(final_url = %passage.verdict.final_url, "link passed the gate");
                    Step::Extract {
                        gate_html: passage.html,
                    }
                }

                Step::Extract { gate_html } => {
                    match self.extract(&gate_html).await {
                        Ok(extraction) => Step::Generate { extraction },
                        Err(e) if e.is_transient() && extract_attempts + 1 < self.config.max_retries => {
                            extract_attempts += 1;
                            warn!(
                                attempt = extract_attempts,
                                max = self.config.max_retries,
                                error = %e,
                                "extraction hit a transient failure, retrying"
                            );
                            backoff_sleep(self.config.retry_backoff_ms, extract_attempts, &self.cancel)
                                .await?;
                            Step::Extract { gate_html }
                        }
                        Err(e) => return Err(e),
                    }
                }

                Step::Generate { extraction } => {
                    let request = self.build_generation_request(&extraction, policy);
                    // The client owns retries and fallback; no second layer here.
                    let outcome = self.client.generate(&request, &self.cancel).await?;
                    Step::Parse { extraction, outcome }
                }

                Step::Parse { extraction, outcome } => {
                    let title_hint = self.title_hint(&extraction);
                    let parsed = parse_cards(&outcome.text, policy, title_hint.as_deref())?;

                    info!(
                        source_type = %source_type,
                        provider = %outcome.provider_name,
                        fallback_used = outcome.fallback_used,
                        cards = parsed.cards.len(),
                        input_tokens = outcome.usage.input_tokens,
                        output_tokens = outcome.usage.output_tokens,
                        latency_ms = outcome.usage.latency_ms,
                        "pipeline run complete"
                    );

                    return Ok(CardSet {
                        topic_title: parsed.topic_title,
                        cards: parsed.cards,
                        provenance: Provenance {
                            source_type,
                            provider: outcome.provider_name,
                            extracted_length: extraction.content.chars().count(),
                        },
                    });
                }
            };
        }
    }

    /// Cheap shape checks before any I/O. Extractors re-validate in depth.
    fn validate_input(&self) -> Result<(), PipelineError> {
        match &self.request.source {
            SourcePayload::Text { title, content } => {
                if title.trim().is_empty() || content.trim().is_empty() {
                    return Err(PipelineError::InvalidInput {
                        reason: "both title and content are required".into(),
                    });
                }
            }
            SourcePayload::Document { file_name, bytes } => {
                if file_name.trim().is_empty() {
                    return Err(PipelineError::InvalidInput {
                        reason: "document file name is required".into(),
                    });
                }
                if bytes.is_empty() {
                    return Err(PipelineError::InvalidInput {
                        reason: format!("document '{file_name}' is empty"),
                    });
                }
            }
            SourcePayload::ImageSet { images } => {
                if images.is_empty() {
                    return Err(PipelineError::InvalidInput {
                        reason: "at least one image is required".into(),
                    });
                }
            }
            SourcePayload::Link { url } => {
                validate_url(url)?;
            }
        }
        Ok(())
    }

    async fn extract(&self, gate_html: &str) -> Result<ExtractionResult, PipelineError> {
        match &self.request.source {
            SourcePayload::Text { title, content } => {
                extract::text::extract_text(title, content, self.config)
            }
            SourcePayload::Document { file_name, bytes } => {
                extract::document::extract_document(file_name, bytes, self.config)
            }
            SourcePayload::ImageSet { images } => {
                extract::image::extract_images(images, &self.client, self.config, &self.cancel)
                    .await
            }
            SourcePayload::Link { url } => {
                let url = validate_url(url)?;
                extract::link::extract_link(
                    &url,
                    gate_html,
                    self.fetcher.as_ref(),
                    self.config,
                    &self.cancel,
                )
                .await
            }
        }
    }

    fn build_generation_request(
        &self,
        extraction: &ExtractionResult,
        policy: crate::config::CardCountPolicy,
    ) -> GenerationRequest {
        let content = extract::truncate_chars(&extraction.content, self.config.max_prompt_chars);
        let title_hint = self.title_hint(extraction);

        let user = match &self.request.source {
            SourcePayload::Text { .. } => text_user_prompt(
                title_hint.as_deref().unwrap_or("Untitled"),
                &content,
                policy,
            ),
            SourcePayload::Document { file_name, .. } => extracted_user_prompt(
                &format!("the document '{file_name}'"),
                title_hint.as_deref(),
                &content,
                policy,
            ),
            SourcePayload::ImageSet { images } => extracted_user_prompt(
                &format!("{} image(s)", images.len()),
                title_hint.as_deref(),
                &content,
                policy,
            ),
            SourcePayload::Link { url } => {
                let link_type = extraction
                    .metadata
                    .get("link_type")
                    .map(String::as_str)
                    .unwrap_or("article");
                extracted_user_prompt(
                    &format!("the {link_type} at {url}"),
                    title_hint.as_deref(),
                    &content,
                    policy,
                )
            }
        };

        GenerationRequest {
            system: card_system_prompt(policy),
            user,
            images: Vec::new(),
            temperature: self.config.card_temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    /// The user's title override wins over whatever the source suggested.
    fn title_hint(&self, extraction: &ExtractionResult) -> Option<String> {
        self.request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| extraction.title_hint.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{cards_json, MockProvider};

    fn mock_config(provider: MockProvider) -> PipelineConfig {
        PipelineConfig::builder()
            .providers(vec![provider.into_handle()])
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn text_source_produces_card_set() {
        let provider = MockProvider::new("mock").with_text(cards_json("Osmosis", 6));
        let config = mock_config(provider);

        let set = generate(
            PipelineRequest::text("Osmosis", "Water crosses membranes toward solutes."),
            &config,
        )
        .await
        .unwrap();

        assert_eq!(set.topic_title, "Osmosis");
        assert_eq!(set.cards.len(), 6);
        assert_eq!(set.provenance.source_type, SourceType::Text);
        assert_eq!(set.provenance.provider, "mock");
    }

    #[tokio::test]
    async fn blank_text_fails_validation_before_any_call() {
        let provider = MockProvider::new("mock");
        let config = mock_config(provider);

        let err = generate(PipelineRequest::text("  ", "content"), &config)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let provider = MockProvider::new("mock").with_text(cards_json("T", 5));
        let config = mock_config(provider);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = generate_with_cancel(
            PipelineRequest::text("T", "some content"),
            &config,
            cancel,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn malformed_provider_output_is_not_retried_by_the_orchestrator() {
        let provider = MockProvider::new("mock").with_text("this is not json");
        let config = mock_config(provider);

        let err = generate(PipelineRequest::text("T", "content"), &config)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedOutput);
    }
}
