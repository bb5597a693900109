//! Manual text: the simplest route — validate and pass through.
//!
//! There is deliberately no hard minimum length by default: the generation
//! step is better at judging whether 150 characters about osmosis are enough
//! material than any character threshold would be. Deployments that want a
//! floor set `min_text_chars` in the config.

use std::collections::HashMap;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::extract::{truncate_chars, ExtractionResult};

/// Validate manual text input and normalise it into an [`ExtractionResult`].
pub(crate) fn extract_text(
    title: &str,
    content: &str,
    config: &PipelineConfig,
) -> Result<ExtractionResult, PipelineError> {
    let title = title.trim();
    let content = content.trim();

    if title.is_empty() || content.is_empty() {
        return Err(PipelineError::InvalidInput {
            reason: "both title and content are required".into(),
        });
    }

    if let Some(floor) = config.min_text_chars {
        let chars = content.chars().count();
        if chars < floor {
            return Err(PipelineError::InvalidInput {
                reason: format!("content is too short: {chars} chars (minimum {floor})"),
            });
        }
    }

    let mut metadata = HashMap::new();
    metadata.insert("content_chars".to_string(), content.chars().count().to_string());

    Ok(ExtractionResult {
        title_hint: Some(title.to_string()),
        content: truncate_chars(content, config.max_extract_chars),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn accepts_short_content_by_default() {
        let config = PipelineConfig::default();
        let result = extract_text("Osmosis", "Water moves across membranes.", &config).unwrap();
        assert_eq!(result.title_hint.as_deref(), Some("Osmosis"));
        assert_eq!(result.content, "Water moves across membranes.");
    }

    #[test]
    fn rejects_blank_fields() {
        let config = PipelineConfig::default();
        for (title, content) in [("", "body"), ("title", ""), ("  ", "  ")] {
            let err = extract_text(title, content, &config).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
    }

    #[test]
    fn configurable_floor_applies() {
        let config = PipelineConfig::builder()
            .min_text_chars(Some(50))
            .build()
            .unwrap();
        let err = extract_text("T", "too short", &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn content_is_truncated_to_budget() {
        let config = PipelineConfig::builder()
            .max_extract_chars(10)
            .build()
            .unwrap();
        let result = extract_text("T", &"x".repeat(100), &config).unwrap();
        assert_eq!(result.content.len(), 10);
    }
}
