//! Gemini provider: the primary generation backend.
//!
//! Calls the `generateContent` REST endpoint directly. Request and response
//! bodies are small serde structs rather than a vendor SDK — the pipeline
//! needs exactly one call shape, and owning the types keeps status
//! classification in our hands.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    classify_status, classify_transport, GenerationProvider, GenerationRequest, ProviderError,
    ProviderResponse,
};
use crate::error::PipelineError;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini `generateContent` client.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    /// Build a provider for the given key and model.
    pub fn new(api_key: String, model: String, timeout_secs: u64) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PipelineError::ProviderNotConfigured {
                hint: format!("failed to build HTTP client for gemini: {e}"),
            })?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }

    fn build_body(request: &GenerationRequest) -> serde_json::Value {
        let mut parts = vec![json!({ "text": request.user })];
        for image in &request.images {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.data,
                }
            }));
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
            },
        });
        // Vision-extract requests carry their instruction as the user turn.
        if !request.system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": request.system }] });
        }
        body
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!(
            "{API_BASE}/{}:generateContent?key={}",
            self.model, self.api_key
        );
        debug!(model = %self.model, images = request.images.len(), "gemini call");

        let response = self
            .client
            .post(&url)
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), retry_after, &body));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode {
                detail: e.to_string(),
            })?;

        let text: String = body
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::Empty);
        }

        let usage = body.usage_metadata.unwrap_or_default();
        Ok(ProviderResponse {
            text,
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        })
    }
}
