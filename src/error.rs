//! Error types for the cardsmith library.
//!
//! Every failure surfaces as a [`PipelineError`] variant carrying enough
//! context to log and act on, plus a flat [`ErrorKind`] tag (via
//! [`PipelineError::kind`]) so callers can classify without destructuring.
//! The caller-facing layer is expected to map kinds to generic user messages
//! while keeping the structured variant for observability.
//!
//! Retry policy lives with the kind, not the call site:
//! [`PipelineError::is_transient`] is the single source of truth for "may be
//! retried with backoff". Everything else is terminal within one invocation.

use thiserror::Error;

/// All errors returned by the cardsmith pipeline.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The request payload failed basic validation before any work started.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The document's declared format is not one we can extract text from.
    #[error("unsupported document format '{format}': only PDF and Word documents are supported")]
    UnsupportedFormat { format: String },

    /// The document was recognised but extraction produced no usable text.
    #[error("document could not be read: {detail}")]
    CorruptDocument { detail: String },

    /// Every image was unreadable, or the vision provider returned no text.
    #[error("no usable content could be extracted from the supplied images")]
    EmptyVisionResult,

    /// Page extraction succeeded but yielded too little text to work with.
    #[error("not enough content extracted from '{url}' ({chars} chars): the page may be mostly images or require JavaScript")]
    InsufficientContent { url: String, chars: usize },

    // ── Link accessibility errors ─────────────────────────────────────────
    /// The URL failed syntax or scheme validation.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The host resolves to a loopback, private, or otherwise internal range.
    #[error("blocked host '{host}': local and internal URLs are not allowed")]
    BlockedHost { host: String },

    /// robots.txt for the origin disallows fetching the target path.
    #[error("robots.txt disallows automated access to '{url}'")]
    RobotsDisallowed { url: String },

    /// The page returned HTTP 404.
    #[error("page not found (404): '{url}'")]
    NotFound { url: String },

    /// The page returned HTTP 403.
    #[error("access forbidden (403): '{url}'")]
    Forbidden { url: String },

    /// The page requires a login (401, login redirect, or auth-wall markers).
    #[error("'{url}' requires a login to view this content")]
    AuthWall { url: String },

    /// Paywall markers were detected in an otherwise successful response.
    #[error("'{url}' is behind a paywall")]
    Paywalled { url: String },

    /// The page returned HTTP 451.
    #[error("content at '{url}' is unavailable in this region (451)")]
    GeoBlocked { url: String },

    /// The link points at a binary resource, not a web page.
    #[error("unexpected content type '{content_type}' at '{url}': {hint}")]
    WrongContentType {
        url: String,
        content_type: String,
        hint: String,
    },

    /// Any non-200 status with no more specific classification.
    #[error("HTTP {status} fetching '{url}'")]
    HttpError { url: String, status: u16 },

    /// Connection failures, timeouts, and 5xx responses after all retries.
    #[error("network error fetching '{url}' after {attempts} attempts: {detail}")]
    TransientNetworkError {
        url: String,
        attempts: u32,
        detail: String,
    },

    // ── Video transcript errors ───────────────────────────────────────────
    /// The video owner has disabled captions.
    #[error("transcripts are disabled for video '{video_id}'")]
    TranscriptsDisabled { video_id: String },

    /// Captions exist but no usable transcript track was found.
    #[error("no transcript available for video '{video_id}': try a video with captions")]
    NoTranscriptFound { video_id: String },

    /// The video is private, deleted, or otherwise unavailable.
    #[error("video '{video_id}' is unavailable, private, or deleted")]
    VideoUnavailable { video_id: String },

    /// A remote service returned HTTP 429.
    #[error("rate limited by {service}: try again in a few minutes")]
    RateLimited { service: String },

    // ── Generation errors ─────────────────────────────────────────────────
    /// No generation provider was injected and no API key is set.
    #[error("no generation provider configured: {hint}")]
    ProviderNotConfigured { hint: String },

    /// Every configured provider exhausted its retry budget.
    #[error("all generation providers exhausted (primary: {primary}; secondary: {secondary})")]
    AllProvidersExhausted { primary: String, secondary: String },

    /// The generated text did not satisfy the structured-output contract.
    ///
    /// Never retried at the parse layer: a malformed *text* still consumed a
    /// full provider call, so the retry budget belongs to the client.
    #[error("generated output failed validation: {detail}")]
    MalformedOutput { detail: String },

    // ── Cancellation ──────────────────────────────────────────────────────
    /// The caller cancelled the invocation.
    #[error("operation cancelled")]
    Cancelled,
}

/// Flat classification tag for a [`PipelineError`].
///
/// Mirrors the error taxonomy one-to-one so callers can `match` on the class
/// of failure (for user messaging, metrics, or retry decisions) without
/// caring about the captured context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    UnsupportedFormat,
    CorruptDocument,
    EmptyVisionResult,
    InsufficientContent,
    InvalidUrl,
    BlockedHost,
    RobotsDisallowed,
    NotFound,
    Forbidden,
    AuthWall,
    Paywalled,
    GeoBlocked,
    WrongContentType,
    HttpError,
    TransientNetworkError,
    TranscriptsDisabled,
    NoTranscriptFound,
    VideoUnavailable,
    RateLimited,
    ProviderNotConfigured,
    AllProvidersExhausted,
    MalformedOutput,
    Cancelled,
}

impl PipelineError {
    /// The flat classification tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidInput { .. } => ErrorKind::InvalidInput,
            PipelineError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            PipelineError::CorruptDocument { .. } => ErrorKind::CorruptDocument,
            PipelineError::EmptyVisionResult => ErrorKind::EmptyVisionResult,
            PipelineError::InsufficientContent { .. } => ErrorKind::InsufficientContent,
            PipelineError::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            PipelineError::BlockedHost { .. } => ErrorKind::BlockedHost,
            PipelineError::RobotsDisallowed { .. } => ErrorKind::RobotsDisallowed,
            PipelineError::NotFound { .. } => ErrorKind::NotFound,
            PipelineError::Forbidden { .. } => ErrorKind::Forbidden,
            PipelineError::AuthWall { .. } => ErrorKind::AuthWall,
            PipelineError::Paywalled { .. } => ErrorKind::Paywalled,
            PipelineError::GeoBlocked { .. } => ErrorKind::GeoBlocked,
            PipelineError::WrongContentType { .. } => ErrorKind::WrongContentType,
            PipelineError::HttpError { .. } => ErrorKind::HttpError,
            PipelineError::TransientNetworkError { .. } => ErrorKind::TransientNetworkError,
            PipelineError::TranscriptsDisabled { .. } => ErrorKind::TranscriptsDisabled,
            PipelineError::NoTranscriptFound { .. } => ErrorKind::NoTranscriptFound,
            PipelineError::VideoUnavailable { .. } => ErrorKind::VideoUnavailable,
            PipelineError::RateLimited { .. } => ErrorKind::RateLimited,
            PipelineError::ProviderNotConfigured { .. } => ErrorKind::ProviderNotConfigured,
            PipelineError::AllProvidersExhausted { .. } => ErrorKind::AllProvidersExhausted,
            PipelineError::MalformedOutput { .. } => ErrorKind::MalformedOutput,
            PipelineError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether this failure class may be retried with backoff.
    ///
    /// Only the orchestrator's extract step consults this; the gate and the
    /// provider client make their retry decisions before an error of this
    /// type ever exists.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientNetworkError | ErrorKind::RateLimited
        )
    }
}
