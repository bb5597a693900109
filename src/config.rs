//! Configuration for the card-generation pipeline.
//!
//! Every knob lives in one [`PipelineConfig`], built through its validating
//! [`PipelineConfigBuilder`]. Keeping the whole surface in a single struct
//! makes it trivial to share a config across concurrent invocations and to
//! log the effective settings of a run.
//!
//! Provider handles and the page fetcher are injectable here so tests (and
//! callers that need caching or rate-limiting middleware) can swap the
//! network edges without touching pipeline logic.

use std::fmt;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::pipeline::fetch::PageFetcher;
use crate::provider::GenerationProvider;

/// Floor and ceiling for the number of cards in a generated set.
///
/// The variance between manual text (5–8) and extracted sources (5–10) is a
/// deliberate product decision, preserved here per source type rather than
/// unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardCountPolicy {
    /// Minimum cards; shortfalls are padded with labelled placeholders.
    pub min: usize,
    /// Maximum cards; overruns are truncated silently.
    pub max: usize,
}

impl CardCountPolicy {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }
}

/// Configuration for one or more pipeline invocations.
///
/// # Example
/// ```rust
/// use cardsmith::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_retries(2)
///     .fetch_timeout_secs(10)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Maximum attempts per transient failure site (gate fetch, provider
    /// call, extract step). Default: 3.
    ///
    /// Most 5xx and timeout errors clear within seconds; three attempts with
    /// exponential backoff catch the vast majority without stalling the
    /// invocation. Permanent errors (404, paywall, bad API key) are never
    /// retried.
    pub max_retries: u32,

    /// Base retry delay in milliseconds, doubled after each attempt.
    /// Default: 1000 (1 s → 2 s → 4 s).
    pub retry_backoff_ms: u64,

    /// Timeout for each page/robots/transcript fetch, in seconds. Default: 15.
    pub fetch_timeout_secs: u64,

    /// Timeout for each provider HTTP call, in seconds. Default: 60.
    pub provider_timeout_secs: u64,

    /// User agent for page fetches. Defaults to a realistic browser string —
    /// many sites serve bot UAs a stripped or blocked page.
    pub user_agent: String,

    /// User agent evaluated against robots.txt rules. Default: "CardsmithBot".
    ///
    /// Deliberately distinct from `user_agent`: robots rules address the
    /// crawler identity, not the rendering engine.
    pub robots_user_agent: String,

    /// Character budget for extracted content. Default: 8000.
    pub max_extract_chars: usize,

    /// Character budget for the content portion of the generation prompt.
    /// Default: 4000. Bounds provider cost and latency per call.
    pub max_prompt_chars: usize,

    /// Minimum characters a link extraction must yield. Default: 200.
    pub min_link_content_chars: usize,

    /// Optional minimum length for manual text input. Default: `None` — the
    /// generation step judges whether short input is sufficient.
    pub min_text_chars: Option<usize>,

    /// Maximum images per request. Default: 10.
    pub max_images: usize,

    /// Maximum bytes per uploaded image. Default: 5 MiB.
    pub max_image_bytes: usize,

    /// Maximum bytes per uploaded document. Default: 2 MiB.
    pub max_document_bytes: usize,

    /// Card count policy for manual text input. Default: 5–8.
    pub text_cards: CardCountPolicy,

    /// Card count policy for document, image, and link sources. Default: 5–10.
    pub source_cards: CardCountPolicy,

    /// Sampling temperature for card generation. Default: 0.7.
    pub card_temperature: f32,

    /// Sampling temperature for vision extraction. Default: 0.3.
    ///
    /// Lower than card generation: transcription should stay faithful to
    /// what is on the image.
    pub vision_temperature: f32,

    /// Maximum tokens a provider may generate per call. Default: 4096.
    pub max_tokens: u32,

    /// Model identifier for the primary provider. Default: "gemini-2.0-flash".
    pub primary_model: String,

    /// Model identifier for the secondary provider. Default: "gpt-4o".
    pub secondary_model: String,

    /// Pre-constructed provider chain, tried in order. When `None`, providers
    /// are resolved from `GEMINI_API_KEY` / `OPENAI_API_KEY` at run time.
    pub providers: Option<Vec<Arc<dyn GenerationProvider>>>,

    /// Pre-constructed page fetcher. When `None`, a reqwest-backed fetcher is
    /// built from the settings above.
    pub fetcher: Option<Arc<dyn PageFetcher>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 1000,
            fetch_timeout_secs: 15,
            provider_timeout_secs: 60,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            robots_user_agent: "CardsmithBot".to_string(),
            max_extract_chars: 8000,
            max_prompt_chars: 4000,
            min_link_content_chars: 200,
            min_text_chars: None,
            max_images: 10,
            max_image_bytes: 5 * 1024 * 1024,
            max_document_bytes: 2 * 1024 * 1024,
            text_cards: CardCountPolicy::new(5, 8),
            source_cards: CardCountPolicy::new(5, 10),
            card_temperature: 0.7,
            vision_temperature: 0.3,
            max_tokens: 4096,
            primary_model: "gemini-2.0-flash".to_string(),
            secondary_model: "gpt-4o".to_string(),
            providers: None,
            fetcher: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("provider_timeout_secs", &self.provider_timeout_secs)
            .field("robots_user_agent", &self.robots_user_agent)
            .field("max_extract_chars", &self.max_extract_chars)
            .field("max_prompt_chars", &self.max_prompt_chars)
            .field("min_link_content_chars", &self.min_link_content_chars)
            .field("min_text_chars", &self.min_text_chars)
            .field("max_images", &self.max_images)
            .field("text_cards", &self.text_cards)
            .field("source_cards", &self.source_cards)
            .field("primary_model", &self.primary_model)
            .field("secondary_model", &self.secondary_model)
            .field(
                "providers",
                &self.providers.as_ref().map(|p| p.len()),
            )
            .field("fetcher", &self.fetcher.as_ref().map(|_| "<dyn PageFetcher>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The card count policy for a given source type.
    pub fn cards_for(&self, source_type: crate::request::SourceType) -> CardCountPolicy {
        match source_type {
            crate::request::SourceType::Text => self.text_cards,
            _ => self.source_cards,
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs.max(1);
        self
    }

    pub fn provider_timeout_secs(mut self, secs: u64) -> Self {
        self.config.provider_timeout_secs = secs.max(1);
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn robots_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.robots_user_agent = ua.into();
        self
    }

    pub fn max_extract_chars(mut self, n: usize) -> Self {
        self.config.max_extract_chars = n;
        self
    }

    pub fn max_prompt_chars(mut self, n: usize) -> Self {
        self.config.max_prompt_chars = n;
        self
    }

    pub fn min_link_content_chars(mut self, n: usize) -> Self {
        self.config.min_link_content_chars = n;
        self
    }

    pub fn min_text_chars(mut self, n: Option<usize>) -> Self {
        self.config.min_text_chars = n;
        self
    }

    pub fn max_images(mut self, n: usize) -> Self {
        self.config.max_images = n.max(1);
        self
    }

    pub fn max_image_bytes(mut self, n: usize) -> Self {
        self.config.max_image_bytes = n;
        self
    }

    pub fn max_document_bytes(mut self, n: usize) -> Self {
        self.config.max_document_bytes = n;
        self
    }

    pub fn text_cards(mut self, policy: CardCountPolicy) -> Self {
        self.config.text_cards = policy;
        self
    }

    pub fn source_cards(mut self, policy: CardCountPolicy) -> Self {
        self.config.source_cards = policy;
        self
    }

    pub fn card_temperature(mut self, t: f32) -> Self {
        self.config.card_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn vision_temperature(mut self, t: f32) -> Self {
        self.config.vision_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn primary_model(mut self, model: impl Into<String>) -> Self {
        self.config.primary_model = model.into();
        self
    }

    pub fn secondary_model(mut self, model: impl Into<String>) -> Self {
        self.config.secondary_model = model.into();
        self
    }

    /// Inject an ordered provider chain (first entry is the primary).
    pub fn providers(mut self, providers: Vec<Arc<dyn GenerationProvider>>) -> Self {
        self.config.providers = Some(providers);
        self
    }

    /// Inject a page fetcher.
    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.config.fetcher = Some(fetcher);
        self
    }

    /// Build the configuration, validating cross-field constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        for (name, policy) in [("text_cards", c.text_cards), ("source_cards", c.source_cards)] {
            if policy.min == 0 || policy.min > policy.max {
                return Err(PipelineError::InvalidInput {
                    reason: format!(
                        "{name} policy must satisfy 1 <= min <= max, got {}..={}",
                        policy.min, policy.max
                    ),
                });
            }
        }
        if let Some(providers) = &c.providers {
            if providers.is_empty() {
                return Err(PipelineError::InvalidInput {
                    reason: "provider chain must not be empty".into(),
                });
            }
        }
        Ok(self.config)
    }
}
