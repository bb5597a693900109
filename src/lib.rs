//! # cardsmith
//!
//! Turn documents, images, web links, and raw notes into structured study
//! cards using LLM providers with automatic fallback.
//!
//! ## Why this crate?
//!
//! The hard part of a study-card product is not the CRUD around review
//! scheduling — it is the ingestion pipeline: pulling trustworthy content
//! out of arbitrary untrusted sources, refusing unreachable or restricted
//! ones with an actionable classification, and driving a structured
//! generation call that survives provider flakiness. cardsmith packages
//! exactly that pipeline, and nothing else: no storage, no accounts, no
//! scheduling.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source
//!  │
//!  ├─ 1. Validate   cheap shape checks on the request
//!  ├─ 2. Gate       (links) robots, private-host, paywall/auth classification
//!  ├─ 3. Extract    PDF/Word text, vision OCR, transcript, readability
//!  ├─ 4. Generate   primary provider → retries → secondary provider
//!  └─ 5. Parse      fence-stripping, JSON contract, per-source count policy
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cardsmith::{generate, PipelineConfig, PipelineRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Providers auto-detected from GEMINI_API_KEY / OPENAI_API_KEY
//!     let config = PipelineConfig::default();
//!     let set = generate(
//!         PipelineRequest::text("Osmosis", "Movement of water across membranes…"),
//!         &config,
//!     )
//!     .await?;
//!     println!("{}: {} cards", set.topic_title, set.cards.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Failure classification
//!
//! Every failure is a [`PipelineError`] with a flat [`ErrorKind`] tag —
//! `Paywalled`, `BlockedHost`, `TranscriptsDisabled`,
//! `AllProvidersExhausted`, and so on — so the caller can map the class to a
//! user-facing message while logging the structured detail. Transient
//! failures are retried with bounded exponential backoff inside the
//! component that observed them; everything else is terminal for the
//! invocation.
//!
//! ## Collaborators
//!
//! cardsmith is a library call, not a service. The caller owns persistence
//! (write the returned [`CardSet`] wherever cards live) and quota (check
//! before calling, debit after a success). Cancellation is the caller's
//! lever too: pass a `CancellationToken` to [`generate_with_cancel`] and
//! every in-flight fetch, provider call, and backoff wait aborts promptly.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod request;
pub mod testing;

mod retry;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CardCountPolicy, PipelineConfig, PipelineConfigBuilder};
pub use error::{ErrorKind, PipelineError};
pub use generate::{check_link, generate, generate_sync, generate_with_cancel};
pub use output::{Card, CardSet, GenerationOutcome, Provenance, ProviderRole, TokenUsage};
pub use pipeline::extract::ExtractionResult;
pub use pipeline::fetch::{FetchError, FetchedPage, HttpFetcher, PageFetcher};
pub use pipeline::gate::{AccessibilityGate, AccessibilityVerdict};
pub use provider::{
    EncodedImage, GeminiProvider, GenerationClient, GenerationProvider, GenerationRequest,
    OpenAiProvider, ProviderError, ProviderResponse,
};
pub use request::{ImageFile, PipelineRequest, SourcePayload, SourceType};
pub use tokio_util::sync::CancellationToken;
