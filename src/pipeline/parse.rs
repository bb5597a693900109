//! Structured-output parsing: free-form generated text → validated cards.
//!
//! Models wrap JSON in code fences no matter how firmly the prompt forbids
//! it, so fences are stripped defensively from both ends before parsing.
//! Everything that fails the contract — unparsable JSON, missing fields, no
//! usable cards — is [`MalformedOutput`] and is **not** retried here: the
//! malformed text already consumed a full provider call, so the retry budget
//! lives in the generation client.
//!
//! The count policy is enforced mechanically: shortfalls are padded with
//! clearly-labelled review placeholders (never fabricated content passed off
//! as generated), overruns are truncated silently.
//!
//! [`MalformedOutput`]: crate::error::PipelineError::MalformedOutput

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::CardCountPolicy;
use crate::error::PipelineError;
use crate::output::Card;

/// Parsed and policy-adjusted cards, before provenance is stamped on.
#[derive(Debug, Clone)]
pub struct ParsedCards {
    pub topic_title: String,
    pub cards: Vec<Card>,
}

/// The JSON contract the generation prompt requests.
///
/// `flashcards` is accepted as a legacy alias for `cards`; some models echo
/// the field name they were trained on rather than the one requested.
#[derive(Debug, Deserialize)]
struct GeneratedPayload {
    #[serde(default)]
    topic_title: String,
    #[serde(alias = "flashcards")]
    cards: Vec<GeneratedCard>,
}

#[derive(Debug, Deserialize)]
struct GeneratedCard {
    title: String,
    content: String,
}

fn malformed(detail: impl Into<String>) -> PipelineError {
    PipelineError::MalformedOutput {
        detail: detail.into(),
    }
}

/// Parse raw generated text into cards, enforcing the count policy.
///
/// `title_fallback` fills `topic_title` when the model omits or blanks it.
pub(crate) fn parse_cards(
    raw_text: &str,
    policy: CardCountPolicy,
    title_fallback: Option<&str>,
) -> Result<ParsedCards, PipelineError> {
    let stripped = strip_code_fences(raw_text);

    let payload: GeneratedPayload = serde_json::from_str(stripped)
        .map_err(|e| malformed(format!("response is not the expected JSON object: {e}")))?;

    let mut cards: Vec<Card> = Vec::with_capacity(payload.cards.len());
    for generated in payload.cards {
        let title = generated.title.trim();
        let content = generated.content.trim();
        if title.is_empty() || content.is_empty() {
            warn!("discarding card with blank title or content");
            continue;
        }
        cards.push(Card::new(title, content));
    }

    if cards.is_empty() {
        return Err(malformed("no usable cards in the response"));
    }

    let topic_title = {
        let generated = payload.topic_title.trim();
        if !generated.is_empty() {
            generated.to_string()
        } else if let Some(fallback) = title_fallback.map(str::trim).filter(|t| !t.is_empty()) {
            fallback.to_string()
        } else {
            return Err(malformed("response is missing a topic title"));
        }
    };

    apply_count_policy(&mut cards, policy);

    Ok(ParsedCards { topic_title, cards })
}

/// Pad to the floor with labelled placeholders, truncate to the ceiling.
fn apply_count_policy(cards: &mut Vec<Card>, policy: CardCountPolicy) {
    if cards.len() > policy.max {
        debug!(
            generated = cards.len(),
            ceiling = policy.max,
            "truncating card overrun"
        );
        cards.truncate(policy.max);
    }
    while cards.len() < policy.min {
        warn!(
            generated = cards.len(),
            floor = policy.min,
            "padding card shortfall with a placeholder"
        );
        cards.push(Card::new(
            format!("Additional Review Point {}", cards.len() + 1),
            "Review the previous concepts and expand your understanding of this topic.",
        ));
    }
}

/// Strip an optional fenced-code wrapper from both ends of the text.
///
/// Handles ```` ```json ````, a bare ```` ``` ````, any other language tag,
/// and a missing closing fence — the same defensive sequence regardless of
/// which provider produced the text.
fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop the remainder of the fence line (language tag or nothing).
        text = match rest.split_once('\n') {
            Some((_, body)) => body,
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }

    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "topic_title": "Osmosis",
        "cards": [
            {"title": "Definition", "content": "Net movement of solvent across a membrane."},
            {"title": "Direction", "content": "Toward higher solute concentration."},
            {"title": "Energy", "content": "Passive, no ATP required."},
            {"title": "Tonicity", "content": "Hypertonic, hypotonic, isotonic environments."},
            {"title": "Examples", "content": "Plant turgor, red blood cell lysis."}
        ]
    }"#;

    fn policy() -> CardCountPolicy {
        CardCountPolicy::new(5, 8)
    }

    #[test]
    fn parses_clean_json() {
        let parsed = parse_cards(VALID, policy(), None).unwrap();
        assert_eq!(parsed.topic_title, "Osmosis");
        assert_eq!(parsed.cards.len(), 5);
        assert_eq!(parsed.cards[0].title, "Definition");
    }

    #[test]
    fn fence_round_trip_matches_unwrapped() {
        let unwrapped = parse_cards(VALID, policy(), None).unwrap();
        for wrapped in [
            format!("```json\n{VALID}\n```"),
            format!("```\n{VALID}\n```"),
            format!("```json\n{VALID}"),
            format!("   ```JSON\n{VALID}\n```   "),
        ] {
            let parsed = parse_cards(&wrapped, policy(), None).unwrap();
            assert_eq!(parsed.topic_title, unwrapped.topic_title);
            assert_eq!(parsed.cards, unwrapped.cards);
        }
    }

    #[test]
    fn accepts_legacy_flashcards_key() {
        let raw = VALID.replace("\"cards\"", "\"flashcards\"");
        let parsed = parse_cards(&raw, policy(), None).unwrap();
        assert_eq!(parsed.cards.len(), 5);
    }

    #[test]
    fn exactly_floor_is_unchanged() {
        let parsed = parse_cards(VALID, policy(), None).unwrap();
        assert_eq!(parsed.cards.len(), 5);
        assert!(!parsed.cards.iter().any(|c| c.title.starts_with("Additional")));
    }

    #[test]
    fn one_below_floor_gains_exactly_one_placeholder() {
        let four = r#"{
            "topic_title": "T",
            "cards": [
                {"title": "a", "content": "1"},
                {"title": "b", "content": "2"},
                {"title": "c", "content": "3"},
                {"title": "d", "content": "4"}
            ]
        }"#;
        let parsed = parse_cards(four, policy(), None).unwrap();
        assert_eq!(parsed.cards.len(), 5);
        let placeholders: Vec<_> = parsed
            .cards
            .iter()
            .filter(|c| c.title.starts_with("Additional Review Point"))
            .collect();
        assert_eq!(placeholders.len(), 1);
        assert_eq!(placeholders[0].title, "Additional Review Point 5");
    }

    #[test]
    fn overrun_is_truncated_to_ceiling() {
        let many: Vec<String> = (0..12)
            .map(|i| format!("{{\"title\": \"t{i}\", \"content\": \"c{i}\"}}"))
            .collect();
        let raw = format!(
            "{{\"topic_title\": \"T\", \"cards\": [{}]}}",
            many.join(",")
        );
        let parsed = parse_cards(&raw, policy(), None).unwrap();
        assert_eq!(parsed.cards.len(), 8);
        assert_eq!(parsed.cards[7].title, "t7");
    }

    #[test]
    fn blank_cards_are_discarded_before_policy() {
        let raw = r#"{
            "topic_title": "T",
            "cards": [
                {"title": "good", "content": "fine"},
                {"title": "   ", "content": "blank title"},
                {"title": "blank content", "content": ""}
            ]
        }"#;
        let parsed = parse_cards(raw, CardCountPolicy::new(1, 8), None).unwrap();
        assert_eq!(parsed.cards.len(), 1);
        assert_eq!(parsed.cards[0].title, "good");
    }

    #[test]
    fn missing_title_falls_back_then_fails() {
        let raw = r#"{"cards": [{"title": "a", "content": "b"}]}"#;
        let parsed = parse_cards(raw, CardCountPolicy::new(1, 8), Some("Fallback")).unwrap();
        assert_eq!(parsed.topic_title, "Fallback");

        let err = parse_cards(raw, CardCountPolicy::new(1, 8), None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedOutput);
    }

    #[test]
    fn malformed_structures_are_rejected() {
        for raw in [
            "not json at all",
            "{\"topic_title\": \"T\"}",
            "{\"topic_title\": \"T\", \"cards\": []}",
            "{\"topic_title\": \"T\", \"cards\": [{\"title\": \"no content\"}]}",
            "[1, 2, 3]",
        ] {
            let err = parse_cards(raw, policy(), None).unwrap_err();
            assert_eq!(
                err.kind(),
                crate::error::ErrorKind::MalformedOutput,
                "input: {raw}"
            );
        }
    }

    #[test]
    fn strip_fences_variants() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}"), "{\"a\":1}");
    }
}
