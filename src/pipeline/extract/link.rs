//! Link extraction: three strategies keyed by URL pattern.
//!
//! - **Video** — fetch the watch page, locate the caption track list, fetch
//!   and flatten the timed-text XML. Skips the HTTP gate entirely; failures
//!   here have their own taxonomy (`TranscriptsDisabled`, `NoTranscriptFound`,
//!   `VideoUnavailable`, `RateLimited`).
//! - **Encyclopedia** — resolve the page title from the `/wiki/` path and ask
//!   the MediaWiki extracts API for plain text. The path segment stays
//!   percent-encoded; the API decodes it server-side.
//! - **Generic article** — readability pass over the HTML the gate already
//!   fetched: semantic containers first, then the densest `<div>` by
//!   paragraph text, then `<body>`; join paragraph/heading/list text and
//!   require a minimum yield.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::extract::{truncate_chars, ExtractionResult};
use crate::pipeline::fetch::{FetchedPage, PageFetcher};
use crate::retry::with_cancel;

/// Which extraction strategy a URL routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStrategy {
    Video,
    Encyclopedia,
    Article,
}

impl LinkStrategy {
    /// Route a URL by host pattern. Anything unrecognised is an article.
    pub fn detect(url: &Url) -> Self {
        let host = url.host_str().unwrap_or_default().to_lowercase();
        if host == "youtu.be" || host == "youtube.com" || host.ends_with(".youtube.com") {
            LinkStrategy::Video
        } else if host.ends_with("wikipedia.org") {
            LinkStrategy::Encyclopedia
        } else {
            LinkStrategy::Article
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LinkStrategy::Video => "video",
            LinkStrategy::Encyclopedia => "encyclopedia",
            LinkStrategy::Article => "article",
        }
    }
}

/// Extract content from an accessible link.
///
/// `html` is the body the gate fetched; it is empty for video links, whose
/// content is fetched here by the transcript strategy.
pub(crate) async fn extract_link(
    url: &Url,
    html: &str,
    fetcher: &dyn PageFetcher,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<ExtractionResult, PipelineError> {
    let strategy = LinkStrategy::detect(url);
    debug!(url = %url, strategy = strategy.label(), "extracting link content");

    let mut result = match strategy {
        LinkStrategy::Video => extract_video(url, fetcher, config, cancel).await?,
        LinkStrategy::Encyclopedia => extract_encyclopedia(url, fetcher, config, cancel).await?,
        LinkStrategy::Article => extract_article(url, html, config)?,
    };
    result
        .metadata
        .insert("link_type".to_string(), strategy.label().to_string());
    Ok(result)
}

// ── Video strategy ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode", default)]
    language_code: String,
}

/// Video id from a share link (`youtu.be/<id>`) or a watch link (`?v=<id>`).
pub(crate) fn video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    if host == "youtu.be" {
        return url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|id| !id.is_empty())
            .map(|id| id.to_string());
    }
    url.query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
}

async fn extract_video(
    url: &Url,
    fetcher: &dyn PageFetcher,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<ExtractionResult, PipelineError> {
    let id = video_id(url).ok_or_else(|| PipelineError::InvalidUrl {
        url: url.to_string(),
        reason: "could not extract a video id".into(),
    })?;

    let watch_url = format!("https://www.youtube.com/watch?v={id}");
    let page = fetch_one(fetcher, &watch_url, cancel).await?;
    classify_video_page(&page, &id)?;

    let tracks = caption_tracks(&page.body, &id)?;
    let track = tracks
        .iter()
        .find(|t| t.language_code.starts_with("en"))
        .or_else(|| tracks.first())
        .ok_or_else(|| PipelineError::NoTranscriptFound {
            video_id: id.clone(),
        })?;

    let transcript_page = fetch_one(fetcher, &track.base_url, cancel).await?;
    let transcript = timed_text(&transcript_page.body);
    if transcript.trim().is_empty() {
        return Err(PipelineError::NoTranscriptFound { video_id: id });
    }

    let title = page_title(&page.body)
        .map(|t| t.replace(" - YouTube", "").trim().to_string())
        .filter(|t| t.len() >= 3)
        .unwrap_or_else(|| format!("YouTube Video: {id}"));

    let content = format!(
        "Video: {title}\n\nTranscript:\n{}",
        truncate_chars(&transcript, config.max_extract_chars)
    );

    let mut metadata = HashMap::new();
    metadata.insert("video_id".to_string(), id);
    Ok(ExtractionResult {
        title_hint: Some(title),
        content: truncate_chars(&content, config.max_extract_chars),
        metadata,
    })
}

fn classify_video_page(page: &FetchedPage, id: &str) -> Result<(), PipelineError> {
    match page.status {
        200 => {}
        429 => {
            return Err(PipelineError::RateLimited {
                service: "youtube".into(),
            })
        }
        status if status >= 500 => {
            return Err(PipelineError::TransientNetworkError {
                url: page.final_url.clone(),
                attempts: 1,
                detail: format!("server error (HTTP {status})"),
            })
        }
        _ => {
            return Err(PipelineError::VideoUnavailable {
                video_id: id.to_string(),
            })
        }
    }

    if page.body.contains("Video unavailable")
        || page.body.contains(r#""playabilityStatus":{"status":"ERROR""#)
    {
        return Err(PipelineError::VideoUnavailable {
            video_id: id.to_string(),
        });
    }
    Ok(())
}

/// The caption track list embedded in the watch page's player response.
///
/// Absent marker → captions are disabled. Present but unparsable or empty →
/// no usable transcript.
fn caption_tracks(body: &str, id: &str) -> Result<Vec<CaptionTrack>, PipelineError> {
    const MARKER: &str = r#""captionTracks":"#;
    let Some(raw) = json_array_after(body, MARKER) else {
        return Err(PipelineError::TranscriptsDisabled {
            video_id: id.to_string(),
        });
    };

    let tracks: Vec<CaptionTrack> =
        serde_json::from_str(raw).map_err(|e| {
            warn!(video_id = id, error = %e, "caption track list did not parse");
            PipelineError::NoTranscriptFound {
                video_id: id.to_string(),
            }
        })?;
    if tracks.is_empty() {
        return Err(PipelineError::NoTranscriptFound {
            video_id: id.to_string(),
        });
    }
    Ok(tracks)
}

/// The balanced JSON array immediately following `marker`, or `None`.
///
/// Depth counting skips over brackets inside string literals and their
/// escapes, which caption URLs are full of.
fn json_array_after<'a>(body: &'a str, marker: &str) -> Option<&'a str> {
    let start = body.find(marker)? + marker.len();
    let rest = &body[start..];
    let open = rest.find('[')?;
    let bytes = rest.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'[' if !in_string => depth += 1,
            b']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&rest[open..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Flatten timed-text XML (`<text start=…>caption</text>`) into one string.
fn timed_text(xml: &str) -> String {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(xml);
    let mut parts: Vec<String> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Text(t)) => {
                if let Ok(text) = t.unescape() {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        parts.push(text);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    parts.join(" ")
}

static RE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"));

/// `<title>` text from raw HTML, entity-decoded just enough for display.
fn page_title(body: &str) -> Option<String> {
    RE_TITLE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| {
            m.as_str()
                .replace("&amp;", "&")
                .replace("&#39;", "'")
                .replace("&quot;", "\"")
                .trim()
                .to_string()
        })
        .filter(|t| !t.is_empty())
}

// ── Encyclopedia strategy ────────────────────────────────────────────────

/// The page-title path segment after `/wiki/`, still percent-encoded.
pub(crate) fn wiki_title_segment(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    segments
        .find(|segment| !segment.is_empty() && *segment != "wiki")
        .map(|s| s.to_string())
}

async fn extract_encyclopedia(
    url: &Url,
    fetcher: &dyn PageFetcher,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<ExtractionResult, PipelineError> {
    let title = wiki_title_segment(url).ok_or_else(|| PipelineError::InvalidUrl {
        url: url.to_string(),
        reason: "could not extract an article title from the path".into(),
    })?;
    let host = url.host_str().unwrap_or("en.wikipedia.org");

    let api_url = format!(
        "https://{host}/w/api.php?action=query&prop=extracts&explaintext=1&redirects=1&format=json&titles={title}"
    );
    let page = fetch_one(fetcher, &api_url, cancel).await?;
    match page.status {
        200 => {}
        status if status >= 500 => {
            return Err(PipelineError::TransientNetworkError {
                url: api_url,
                attempts: 1,
                detail: format!("server error (HTTP {status})"),
            })
        }
        429 => {
            return Err(PipelineError::RateLimited {
                service: "wikipedia".into(),
            })
        }
        status => return Err(PipelineError::HttpError { url: api_url, status }),
    }

    let body: serde_json::Value = match serde_json::from_str(&page.body) {
        Ok(value) => value,
        Err(e) => {
            warn!(url = %api_url, error = %e, "extracts API response did not parse");
            return Err(PipelineError::InsufficientContent {
                url: url.to_string(),
                chars: 0,
            });
        }
    };

    let pages = body
        .get("query")
        .and_then(|q| q.get("pages"))
        .and_then(|p| p.as_object());
    let entry = pages.and_then(|map| map.values().next());

    let Some(entry) = entry else {
        return Err(PipelineError::NotFound {
            url: url.to_string(),
        });
    };
    if entry.get("missing").is_some() {
        return Err(PipelineError::NotFound {
            url: url.to_string(),
        });
    }

    let extract = entry
        .get("extract")
        .and_then(|e| e.as_str())
        .unwrap_or_default();
    if extract.trim().is_empty() {
        return Err(PipelineError::InsufficientContent {
            url: url.to_string(),
            chars: 0,
        });
    }

    let title_hint = entry
        .get("title")
        .and_then(|t| t.as_str())
        .map(|t| t.to_string());

    Ok(ExtractionResult {
        title_hint,
        content: truncate_chars(extract, config.max_extract_chars),
        metadata: HashMap::new(),
    })
}

// ── Generic article strategy ─────────────────────────────────────────────

/// Container selectors tried in order before falling back to density.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    ".content",
    ".post-content",
    ".article-content",
];

/// Readability extraction over already-fetched HTML.
pub(crate) fn extract_article(
    url: &Url,
    html: &str,
    config: &PipelineConfig,
) -> Result<ExtractionResult, PipelineError> {
    let document = Html::parse_document(html);

    let title_hint = select_text(&document, "h1")
        .filter(|t| !t.is_empty())
        .or_else(|| select_text(&document, "title").filter(|t| !t.is_empty()));

    let content = article_body_text(&document);
    let content = truncate_chars(&content, config.max_extract_chars);

    let chars = content.chars().count();
    if chars < config.min_link_content_chars {
        return Err(PipelineError::InsufficientContent {
            url: url.to_string(),
            chars,
        });
    }

    Ok(ExtractionResult {
        title_hint,
        content,
        metadata: HashMap::new(),
    })
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

static PARTS_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p, h2, h3, li").expect("static selector"));
static P_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("static selector"));
static DIV_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div").expect("static selector"));
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("static selector"));

/// Paragraph/heading/list text from the best content container.
fn article_body_text(document: &Html) -> String {
    // Pass 1: semantic containers.
    for selector_str in CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(container) = document.select(&selector).next() {
                let text = joined_parts(container, &PARTS_SELECTOR);
                if !text.is_empty() {
                    return text;
                }
            }
        }
    }

    // Pass 2: densest <div> by contained paragraph text.
    let densest = document
        .select(&DIV_SELECTOR)
        .map(|div| {
            let score: usize = div
                .select(&P_SELECTOR)
                .map(|p| p.text().collect::<String>().trim().len())
                .sum();
            (score, div)
        })
        .max_by_key(|(score, _)| *score);
    if let Some((score, div)) = densest {
        if score > 0 {
            let text = joined_parts(div, &PARTS_SELECTOR);
            if !text.is_empty() {
                return text;
            }
        }
    }

    // Pass 3: whatever the body yields.
    if let Some(body) = document.select(&BODY_SELECTOR).next() {
        return joined_parts(body, &PARTS_SELECTOR);
    }
    String::new()
}

fn joined_parts(container: scraper::ElementRef<'_>, parts: &Selector) -> String {
    container
        .select(parts)
        .map(|el| el.text().collect::<String>().trim().to_string())
        // Short snippets are navigation crumbs, timestamps, share buttons.
        .filter(|text| text.len() > 30)
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ── Shared ───────────────────────────────────────────────────────────────

/// One cancellable fetch, mapping transport failures to the transient kind
/// (the orchestrator owns the retry budget for extraction).
async fn fetch_one(
    fetcher: &dyn PageFetcher,
    url: &str,
    cancel: &CancellationToken,
) -> Result<FetchedPage, PipelineError> {
    with_cancel(cancel, fetcher.fetch(url))
        .await?
        .map_err(|e| PipelineError::TransientNetworkError {
            url: url.to_string(),
            attempts: 1,
            detail: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn strategy_detection() {
        assert_eq!(
            LinkStrategy::detect(&url("https://www.youtube.com/watch?v=abc123")),
            LinkStrategy::Video
        );
        assert_eq!(
            LinkStrategy::detect(&url("https://youtu.be/abc123")),
            LinkStrategy::Video
        );
        assert_eq!(
            LinkStrategy::detect(&url("https://en.wikipedia.org/wiki/Osmosis")),
            LinkStrategy::Encyclopedia
        );
        assert_eq!(
            LinkStrategy::detect(&url("https://example.com/blog/post")),
            LinkStrategy::Article
        );
        // Lookalike domain is just an article.
        assert_eq!(
            LinkStrategy::detect(&url("https://notyoutube.com/watch?v=abc")),
            LinkStrategy::Article
        );
    }

    #[test]
    fn video_id_extraction() {
        assert_eq!(
            video_id(&url("https://youtu.be/dQw4w9WgXcQ")).as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            video_id(&url("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42")).as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert!(video_id(&url("https://www.youtube.com/feed/library")).is_none());
    }

    #[test]
    fn wiki_title_from_path() {
        assert_eq!(
            wiki_title_segment(&url("https://en.wikipedia.org/wiki/Osmosis")).as_deref(),
            Some("Osmosis")
        );
        // Percent-encoded titles stay encoded for the API.
        assert_eq!(
            wiki_title_segment(&url("https://fr.wikipedia.org/wiki/%C3%89nergie")).as_deref(),
            Some("%C3%89nergie")
        );
        assert!(wiki_title_segment(&url("https://en.wikipedia.org/")).is_none());
    }

    #[test]
    fn balanced_array_scanner() {
        let body = r#"junk "captionTracks":[{"baseUrl":"https://x/api?k=[1]","languageCode":"en"}],"other":1"#;
        let raw = json_array_after(body, r#""captionTracks":"#).unwrap();
        let tracks: Vec<CaptionTrack> = serde_json::from_str(raw).unwrap();
        assert_eq!(tracks.len(), 1);
        // Brackets inside the string literal did not confuse the scanner.
        assert_eq!(tracks[0].base_url, "https://x/api?k=[1]");

        assert!(json_array_after("no marker here", r#""captionTracks":"#).is_none());
    }

    #[test]
    fn timed_text_flattens_and_unescapes() {
        let xml = r#"<?xml version="1.0"?><transcript>
            <text start="0.0" dur="2.1">Water moves</text>
            <text start="2.1" dur="3.0">across membranes &amp; cells</text>
        </transcript>"#;
        assert_eq!(timed_text(xml), "Water moves across membranes & cells");
    }

    #[test]
    fn caption_classification() {
        let disabled = caption_tracks("<html>no captions here</html>", "vid").unwrap_err();
        assert_eq!(disabled.kind(), crate::error::ErrorKind::TranscriptsDisabled);

        let none = caption_tracks(r#""captionTracks":[]"#, "vid").unwrap_err();
        assert_eq!(none.kind(), crate::error::ErrorKind::NoTranscriptFound);
    }

    #[test]
    fn article_extraction_prefers_semantic_container() {
        let html = r#"<html><head><title>Site</title></head><body>
            <nav><p>Home About Contact Careers Privacy Terms</p></nav>
            <article>
                <h1>Osmosis Explained</h1>
                <p>Osmosis is the spontaneous net movement of solvent molecules through a membrane.</p>
                <p>It moves toward a region of higher solute concentration, equalising the two sides.</p>
                <p>This passive process requires no energy input from the cell whatsoever to proceed.</p>
            </article>
        </body></html>"#;
        let config = PipelineConfig::default();
        let result = extract_article(&url("https://example.com/osmosis"), html, &config).unwrap();
        assert_eq!(result.title_hint.as_deref(), Some("Osmosis Explained"));
        assert!(result.content.contains("spontaneous net movement"));
        assert!(!result.content.contains("Home About"));
    }

    #[test]
    fn article_density_fallback_without_semantic_tags() {
        let paragraph = "This sentence is deliberately longer than thirty characters of text. ";
        let html = format!(
            "<html><body><div id=\"sidebar\"><p>tiny</p></div><div id=\"story\">{}</div></body></html>",
            format!("<p>{}</p>", paragraph.repeat(10)).repeat(3)
        );
        let config = PipelineConfig::default();
        let result = extract_article(&url("https://example.com/a"), &html, &config).unwrap();
        assert!(result.content.contains("deliberately longer"));
    }

    #[test]
    fn thin_page_is_insufficient_content() {
        let html = "<html><body><article><p>Far too short to learn anything from.</p></article></body></html>";
        let config = PipelineConfig::default();
        let err = extract_article(&url("https://example.com/thin"), html, &config).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InsufficientContent);
    }

    #[test]
    fn page_title_strips_entities() {
        let body = "<html><head><title>Cells &amp; Membranes - YouTube</title></head></html>";
        assert_eq!(
            page_title(body).as_deref(),
            Some("Cells & Membranes - YouTube")
        );
    }
}
