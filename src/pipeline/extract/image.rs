//! Image-set extraction: photos of notes/slides → descriptive text.
//!
//! The set (1–10 images, size-capped) is bundled into a *single* vision call
//! through the generation client — the output of that call is content, not
//! cards; card generation happens afterwards like for any other source.
//!
//! Unreadable images are skipped rather than failing the set: one blurry
//! photo should not discard nine good ones. Only when nothing survives, or
//! the provider has nothing to say about what did, is the set rejected with
//! [`EmptyVisionResult`].
//!
//! [`EmptyVisionResult`]: crate::error::PipelineError::EmptyVisionResult

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::extract::{truncate_chars, ExtractionResult};
use crate::prompts::VISION_EXTRACT_PROMPT;
use crate::provider::{EncodedImage, GenerationClient, GenerationRequest};
use crate::request::ImageFile;

/// Validate and base64-encode an image set for a vision request.
///
/// Count and per-image size violations are `InvalidInput`; undecodable
/// images are skipped with a warning; an empty survivor list is
/// `EmptyVisionResult`.
pub(crate) fn prepare_images(
    images: &[ImageFile],
    config: &PipelineConfig,
) -> Result<Vec<EncodedImage>, PipelineError> {
    if images.is_empty() {
        return Err(PipelineError::InvalidInput {
            reason: "at least one image is required".into(),
        });
    }
    if images.len() > config.max_images {
        return Err(PipelineError::InvalidInput {
            reason: format!(
                "{} images supplied, maximum is {}",
                images.len(),
                config.max_images
            ),
        });
    }

    let mut encoded = Vec::with_capacity(images.len());
    for (index, file) in images.iter().enumerate() {
        if file.bytes.len() > config.max_image_bytes {
            return Err(PipelineError::InvalidInput {
                reason: format!(
                    "image {} ('{}') is {} bytes, exceeding the {} byte limit",
                    index + 1,
                    file.file_name,
                    file.bytes.len(),
                    config.max_image_bytes
                ),
            });
        }

        let mime_type = match readable_mime(&file.bytes) {
            Some(mime) => mime,
            None => {
                warn!(file = %file.file_name, "skipping unreadable image");
                continue;
            }
        };

        encoded.push(EncodedImage {
            data: STANDARD.encode(&file.bytes),
            mime_type: mime_type.to_string(),
        });
    }

    if encoded.is_empty() {
        return Err(PipelineError::EmptyVisionResult);
    }
    Ok(encoded)
}

/// Mime type for the image if it decodes as a supported format.
fn readable_mime(bytes: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(bytes).ok()?;
    let mime = match format {
        image::ImageFormat::Png => "image/png",
        image::ImageFormat::Jpeg => "image/jpeg",
        image::ImageFormat::WebP => "image/webp",
        _ => return None,
    };
    // A plausible header is not enough; make sure the pixels decode.
    image::load_from_memory_with_format(bytes, format).ok()?;
    Some(mime)
}

/// Run the vision-extraction call over a prepared image set.
pub(crate) async fn extract_images(
    images: &[ImageFile],
    client: &GenerationClient,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<ExtractionResult, PipelineError> {
    let encoded = prepare_images(images, config)?;
    debug!(
        supplied = images.len(),
        usable = encoded.len(),
        "running vision extraction"
    );

    let request = GenerationRequest {
        system: String::new(),
        user: VISION_EXTRACT_PROMPT.to_string(),
        images: encoded.clone(),
        temperature: config.vision_temperature,
        max_tokens: config.max_tokens,
    };

    let outcome = client.generate(&request, cancel).await?;
    let content = outcome.text.trim().to_string();
    if content.is_empty() {
        return Err(PipelineError::EmptyVisionResult);
    }

    let mut metadata = HashMap::new();
    metadata.insert("images_supplied".to_string(), images.len().to_string());
    metadata.insert("images_used".to_string(), encoded.len().to_string());
    metadata.insert("vision_provider".to_string(), outcome.provider_name);

    Ok(ExtractionResult {
        title_hint: None,
        content: truncate_chars(&content, config.max_extract_chars),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// Minimal valid 1×1 PNG produced through the image crate itself.
    fn tiny_png() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            1,
            1,
            image::Rgba([255, 0, 0, 255]),
        ));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn encodes_valid_png() {
        let config = PipelineConfig::default();
        let files = vec![ImageFile::new("page1.png", tiny_png())];
        let encoded = prepare_images(&files, &config).unwrap();
        assert_eq!(encoded.len(), 1);
        assert_eq!(encoded[0].mime_type, "image/png");
        assert!(STANDARD.decode(&encoded[0].data).is_ok());
    }

    #[test]
    fn empty_set_is_invalid_input() {
        let config = PipelineConfig::default();
        let err = prepare_images(&[], &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn too_many_images_is_invalid_input() {
        let config = PipelineConfig::builder().max_images(2).build().unwrap();
        let files = vec![
            ImageFile::new("a.png", tiny_png()),
            ImageFile::new("b.png", tiny_png()),
            ImageFile::new("c.png", tiny_png()),
        ];
        let err = prepare_images(&files, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn oversized_image_is_invalid_input() {
        let config = PipelineConfig::builder().max_image_bytes(8).build().unwrap();
        let files = vec![ImageFile::new("big.png", tiny_png())];
        let err = prepare_images(&files, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn unreadable_images_are_skipped_not_fatal() {
        let config = PipelineConfig::default();
        let files = vec![
            ImageFile::new("broken.png", vec![0, 1, 2, 3]),
            ImageFile::new("good.png", tiny_png()),
        ];
        let encoded = prepare_images(&files, &config).unwrap();
        assert_eq!(encoded.len(), 1);
    }

    #[test]
    fn all_unreadable_is_empty_vision_result() {
        let config = PipelineConfig::default();
        let files = vec![
            ImageFile::new("a.bin", vec![0, 1, 2, 3]),
            ImageFile::new("b.bin", vec![9, 9, 9, 9]),
        ];
        let err = prepare_images(&files, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyVisionResult);
    }
}
