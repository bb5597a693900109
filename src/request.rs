//! Request types: what the caller hands to the pipeline.
//!
//! A [`PipelineRequest`] is immutable once constructed. The payload variants
//! mirror the four ingestion routes; everything else (title override, caller
//! id, base date) is optional metadata that rides along untouched.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The four kinds of source material the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Manually typed title + description.
    Text,
    /// An uploaded PDF or Word document.
    Document,
    /// A set of uploaded images (photos of notes, slides, whiteboards).
    ImageSet,
    /// A web link (article, encyclopedia page, or video).
    Link,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceType::Text => "text",
            SourceType::Document => "document",
            SourceType::ImageSet => "image_set",
            SourceType::Link => "link",
        };
        f.write_str(s)
    }
}

/// One uploaded image: original file name plus raw bytes.
///
/// The file name is only used for logging and for error messages; the actual
/// format is detected from the bytes during extraction.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// The source material itself, one variant per ingestion route.
#[derive(Debug, Clone)]
pub enum SourcePayload {
    /// Raw user text. Both fields are required; length sufficiency is judged
    /// downstream by the generation step unless a floor is configured.
    Text { title: String, content: String },
    /// Document bytes with the original file name (the extension selects the
    /// extraction routine).
    Document { file_name: String, bytes: Vec<u8> },
    /// 1–10 images, size-capped per image.
    ImageSet { images: Vec<ImageFile> },
    /// A web URL. `https://` is assumed when no scheme is given.
    Link { url: String },
}

/// Immutable input to one pipeline invocation.
///
/// # Example
/// ```rust
/// use cardsmith::PipelineRequest;
///
/// let request = PipelineRequest::text("Osmosis", "Movement of water across membranes…")
///     .with_user_id("user-42");
/// ```
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// The source material.
    pub source: SourcePayload,
    /// Optional caller-supplied title, used as a hint for document, image,
    /// and link sources (text sources carry their title in the payload).
    pub title: Option<String>,
    /// Optional caller identifier, used only for tracing.
    pub user_id: Option<String>,
    /// Optional base date for the external revision scheduler. Forwarded in
    /// the request untouched; this library never interprets it.
    pub base_date: Option<NaiveDate>,
}

impl PipelineRequest {
    /// Build a request from manually typed text.
    pub fn text(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(SourcePayload::Text {
            title: title.into(),
            content: content.into(),
        })
    }

    /// Build a request from an uploaded document.
    pub fn document(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(SourcePayload::Document {
            file_name: file_name.into(),
            bytes,
        })
    }

    /// Build a request from a set of uploaded images.
    pub fn images(images: Vec<ImageFile>) -> Self {
        Self::new(SourcePayload::ImageSet { images })
    }

    /// Build a request from a web link.
    pub fn link(url: impl Into<String>) -> Self {
        Self::new(SourcePayload::Link { url: url.into() })
    }

    fn new(source: SourcePayload) -> Self {
        Self {
            source,
            title: None,
            user_id: None,
            base_date: None,
        }
    }

    /// Attach a title hint (ignored for text sources, which carry their own).
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attach a caller identifier for tracing.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach a base date for the external scheduler.
    pub fn with_base_date(mut self, date: NaiveDate) -> Self {
        self.base_date = Some(date);
        self
    }

    /// The source type tag for this request.
    pub fn source_type(&self) -> SourceType {
        match self.source {
            SourcePayload::Text { .. } => SourceType::Text,
            SourcePayload::Document { .. } => SourceType::Document,
            SourcePayload::ImageSet { .. } => SourceType::ImageSet,
            SourcePayload::Link { .. } => SourceType::Link,
        }
    }
}
