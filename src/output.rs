//! Output types: what the pipeline hands back to the caller.
//!
//! [`CardSet`] is the terminal success value — the only artifact the caller
//! persists into its card store. [`GenerationOutcome`] carries the
//! cost/latency attribution for one provider call; which provider actually
//! served the request is a first-class field because the caller pays for it.

use serde::{Deserialize, Serialize};

use crate::request::SourceType;

/// One study card: a short title plus a self-contained explanation.
///
/// `content` may use lightweight Markdown (bold, lists, code, quotes); the
/// pipeline treats it as opaque text and never validates markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    pub content: String,
}

impl Card {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Where a card set came from, for logging and cost attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    /// Which ingestion route produced the content.
    pub source_type: SourceType,
    /// Name of the provider that served the card-generation call.
    pub provider: String,
    /// Length in characters of the extracted content fed to generation.
    pub extracted_length: usize,
}

/// The validated result of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardSet {
    /// Topic title, either generated or carried over from the user's input.
    pub topic_title: String,
    /// Between the configured floor and ceiling for the source type; every
    /// card has a non-empty title and content.
    pub cards: Vec<Card>,
    pub provenance: Provenance,
}

/// Which slot in the fallback chain served a generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
    Primary,
    Secondary,
}

/// Token and latency accounting for one successful generation call.
///
/// Token counts are zero when the provider does not report usage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
}

/// The result of one successful call through the generation client.
///
/// Failed attempts are counted but not retained; `attempts` is the number of
/// tries made against the primary provider and `fallback_attempts` against
/// the secondary (zero when fallback was not reached).
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// Raw generated text, exactly as returned by the provider.
    pub text: String,
    /// Slot that produced `text`.
    pub provider: ProviderRole,
    /// Name of the provider implementation that produced `text`.
    pub provider_name: String,
    pub usage: TokenUsage,
    /// Attempts made against the primary provider.
    pub attempts: u32,
    /// Attempts made against the secondary provider; 0 when unused.
    pub fallback_attempts: u32,
    /// True when the secondary provider served the request.
    pub fallback_used: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_set_round_trips_through_json() {
        let set = CardSet {
            topic_title: "Osmosis".into(),
            cards: vec![Card::new("Definition", "Movement of water…")],
            provenance: Provenance {
                source_type: SourceType::Text,
                provider: "gemini".into(),
                extracted_length: 160,
            },
        };

        let json = serde_json::to_string(&set).unwrap();
        let back: CardSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back.topic_title, "Osmosis");
        assert_eq!(back.cards.len(), 1);
        assert_eq!(back.provenance.provider, "gemini");
    }

    #[test]
    fn provider_role_serialises_snake_case() {
        assert_eq!(
            serde_json::to_string(&ProviderRole::Secondary).unwrap(),
            "\"secondary\""
        );
    }
}
