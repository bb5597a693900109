//! Document extraction: PDF and Word bytes → plain text.
//!
//! Format dispatch is on the declared file extension, matching how the
//! upload surface names files. PDF text comes from lopdf's per-page
//! extraction; Word documents are OOXML containers, so we unzip
//! `word/document.xml` and collect the `<w:t>` text runs, breaking
//! paragraphs at `</w:p>`.
//!
//! Either route ending with no usable text is a [`CorruptDocument`] — a
//! scanned PDF with no text layer looks exactly like this, and the caller
//! should steer the user to the image pipeline instead.
//!
//! [`CorruptDocument`]: crate::error::PipelineError::CorruptDocument

use std::collections::HashMap;
use std::io::{Cursor, Read};

use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::extract::{truncate_chars, ExtractionResult};

/// Supported document formats, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Pdf,
    Docx,
}

fn detect_format(file_name: &str) -> Result<DocumentFormat, PipelineError> {
    let extension = file_name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    match extension.as_str() {
        "pdf" => Ok(DocumentFormat::Pdf),
        "doc" | "docx" => Ok(DocumentFormat::Docx),
        other => Err(PipelineError::UnsupportedFormat {
            format: if other.is_empty() {
                "(none)".to_string()
            } else {
                other.to_string()
            },
        }),
    }
}

fn corrupt(detail: impl std::fmt::Display) -> PipelineError {
    PipelineError::CorruptDocument {
        detail: detail.to_string(),
    }
}

/// Extract text from an uploaded document.
pub(crate) fn extract_document(
    file_name: &str,
    bytes: &[u8],
    config: &PipelineConfig,
) -> Result<ExtractionResult, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::InvalidInput {
            reason: format!("document '{file_name}' is empty"),
        });
    }
    if bytes.len() > config.max_document_bytes {
        return Err(PipelineError::InvalidInput {
            reason: format!(
                "document '{file_name}' is {} bytes, exceeding the {} byte limit",
                bytes.len(),
                config.max_document_bytes
            ),
        });
    }

    let format = detect_format(file_name)?;
    debug!(file_name, ?format, bytes = bytes.len(), "extracting document");

    let (text, title_hint, mut metadata) = match format {
        DocumentFormat::Pdf => extract_pdf(bytes)?,
        DocumentFormat::Docx => (extract_docx(bytes)?, None, HashMap::new()),
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(corrupt(
            "no text could be extracted; the document may be scanned images",
        ));
    }

    metadata.insert("text_chars".to_string(), text.chars().count().to_string());

    Ok(ExtractionResult {
        title_hint,
        content: truncate_chars(text, config.max_extract_chars),
        metadata,
    })
}

/// PDF route: per-page text via lopdf, plus the Info-dictionary title when
/// the document carries one.
fn extract_pdf(
    bytes: &[u8],
) -> Result<(String, Option<String>, HashMap<String, String>), PipelineError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(corrupt)?;

    let pages = doc.get_pages();
    let mut parts: Vec<String> = Vec::with_capacity(pages.len());
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(text) => parts.push(text),
            Err(e) => warn!(page = page_num, error = %e, "skipping unreadable page"),
        }
    }
    if parts.is_empty() {
        return Err(corrupt("every page failed text extraction"));
    }

    let mut metadata = HashMap::new();
    metadata.insert("pages".to_string(), pages.len().to_string());

    Ok((parts.join("\n"), pdf_title(&doc), metadata))
}

/// Title from the PDF trailer's Info dictionary, when present.
fn pdf_title(doc: &lopdf::Document) -> Option<String> {
    let info_ref = doc.trailer.get(b"Info").ok()?.as_reference().ok()?;
    let info = doc.get_object(info_ref).ok()?.as_dict().ok()?;
    let raw = info.get(b"Title").ok()?.as_str().ok()?;

    // Info strings are either UTF-16BE with a BOM or roughly Latin-1.
    let title = if raw.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = raw[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(raw).into_owned()
    };

    let title = title.trim().to_string();
    (!title.is_empty()).then_some(title)
}

/// Word route: unzip the OOXML container and walk `word/document.xml`.
fn extract_docx(bytes: &[u8]) -> Result<String, PipelineError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| corrupt("missing word/document.xml; not a Word document"))?
        .read_to_string(&mut xml)
        .map_err(corrupt)?;
    docx_body_text(&xml)
}

/// Collect `<w:t>` runs from the document body, one line per paragraph.
pub(crate) fn docx_body_text(xml: &str) -> Result<String, PipelineError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event().map_err(corrupt)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text_run = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text_run => {
                out.push_str(&t.unescape().map_err(corrupt)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const DOC_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Cell membranes are </w:t></w:r><w:r><w:t>selectively permeable.</w:t></w:r></w:p>
    <w:p><w:r><w:t>Osmosis &amp; diffusion differ.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    fn docx_fixture(document_xml: &str) -> Vec<u8> {
        use std::io::Write;
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let config = PipelineConfig::default();
        let err = extract_document("slides.pptx", b"data", &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);

        let err = extract_document("noextension", b"data", &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn oversized_document_is_rejected() {
        let config = PipelineConfig::builder()
            .max_document_bytes(16)
            .build()
            .unwrap();
        let err = extract_document("notes.pdf", &[0u8; 64], &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn empty_document_is_invalid_input() {
        let config = PipelineConfig::default();
        let err = extract_document("notes.pdf", b"", &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn garbage_pdf_is_corrupt() {
        let config = PipelineConfig::default();
        let err = extract_document("notes.pdf", b"not a pdf at all", &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptDocument);
    }

    #[test]
    fn docx_fixture_extracts_paragraph_text() {
        let config = PipelineConfig::default();
        let bytes = docx_fixture(DOC_XML);
        let result = extract_document("notes.docx", &bytes, &config).unwrap();
        assert!(result.content.contains("selectively permeable."));
        assert!(result.content.contains("Osmosis & diffusion differ."));
        // Paragraph boundary preserved as a line break.
        assert!(result.content.contains("permeable.\n"));
    }

    #[test]
    fn zip_without_document_xml_is_corrupt() {
        use std::io::Write;
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("unrelated.txt", options).unwrap();
            writer.write_all(b"hello").unwrap();
            writer.finish().unwrap();
        }
        let config = PipelineConfig::default();
        let err = extract_document("notes.docx", &cursor.into_inner(), &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptDocument);
    }

    #[test]
    fn docx_body_text_handles_entities() {
        let text = docx_body_text(DOC_XML).unwrap();
        assert!(text.contains("Osmosis & diffusion"));
    }
}
