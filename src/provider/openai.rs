//! OpenAI provider: the secondary (fallback) generation backend.
//!
//! Calls the chat-completions REST endpoint. Images are attached as data-URI
//! `image_url` parts, which is also how vision-extract requests reach this
//! provider when the primary is down.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    classify_status, classify_transport, GenerationProvider, GenerationRequest, ProviderError,
    ProviderResponse,
};
use crate::error::PipelineError;

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI chat-completions client.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    /// Build a provider for the given key and model.
    pub fn new(api_key: String, model: String, timeout_secs: u64) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PipelineError::ProviderNotConfigured {
                hint: format!("failed to build HTTP client for openai: {e}"),
            })?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }

    fn build_body(&self, request: &GenerationRequest) -> serde_json::Value {
        // Plain-string content for text-only calls; the array form is only
        // needed when image parts are attached.
        let user_content = if request.images.is_empty() {
            json!(request.user)
        } else {
            let mut parts = vec![json!({ "type": "text", "text": request.user })];
            for image in &request.images {
                parts.push(json!({
                    "type": "image_url",
                    "image_url": {
                        "url": format!("data:{};base64,{}", image.mime_type, image.data),
                    }
                }));
            }
            json!(parts)
        };

        let mut messages = Vec::new();
        if !request.system.is_empty() {
            messages.push(json!({ "role": "system", "content": request.system }));
        }
        messages.push(json!({ "role": "user", "content": user_content }));

        json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(model = %self.model, images = request.images.len(), "openai call");

        let response = self
            .client
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&self.build_body(request))
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

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode {
                detail: e.to_string(),
            })?;

        let text = body
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::Empty);
        }

        let usage = body.usage.unwrap_or_default();
        Ok(ProviderResponse {
            text,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::EncodedImage;

    #[test]
    fn text_only_body_uses_plain_string_content() {
        let provider = OpenAiProvider::new("k".into(), "gpt-4o".into(), 60).unwrap();
        let body = provider.build_body(&GenerationRequest {
            system: "sys".into(),
            user: "usr".into(),
            images: vec![],
            temperature: 0.7,
            max_tokens: 4096,
        });
        assert_eq!(body["messages"][1]["content"], "usr");
        assert_eq!(body["model"], "gpt-4o");
    }

    #[test]
    fn vision_body_attaches_data_uris() {
        let provider = OpenAiProvider::new("k".into(), "gpt-4o".into(), 60).unwrap();
        let body = provider.build_body(&GenerationRequest {
            system: "sys".into(),
            user: "usr".into(),
            images: vec![EncodedImage {
                data: "QUJD".into(),
                mime_type: "image/jpeg".into(),
            }],
            temperature: 0.3,
            max_tokens: 4096,
        });
        let url = body["messages"][1]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,QUJD"));
    }

    #[test]
    fn response_shape_parses() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "hi"}}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hi"));
        assert_eq!(parsed.usage.unwrap().completion_tokens, 3);
    }
}
