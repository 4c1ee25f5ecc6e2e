//! Payload checks and MIME handling for acquired images

use super::strategy::AcquisitionError;
use bytes::Bytes;
use std::time::Duration;

/// Fallback MIME type when nothing better is known
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Whether a declared content type is `image/*`
#[must_use]
pub fn is_image_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
}

/// MIME type guessed from magic bytes
#[must_use]
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|format| format.to_mime_type())
}

/// Content type to upload with: declared `image/*`, else sniffed, else PNG
#[must_use]
pub fn coerce_image_mime(declared: Option<&str>, bytes: &[u8]) -> String {
    if is_image_content_type(declared) {
        if let Some(ct) = declared {
            // drop parameters such as "; charset=binary"
            let essence = ct.split(';').next().unwrap_or(ct).trim();
            return essence.to_ascii_lowercase();
        }
    }
    sniff_mime(bytes).unwrap_or(DEFAULT_IMAGE_MIME).to_string()
}

/// File extension for an image MIME type
#[must_use]
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/avif" => "avif",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        _ => "png",
    }
}

/// Reject payloads below `min` bytes
///
/// # Errors
/// - `AcquisitionError::TooSmall`
pub fn check_min_size(bytes: &[u8], min: usize) -> Result<(), AcquisitionError> {
    if bytes.len() < min {
        return Err(AcquisitionError::TooSmall {
            size: bytes.len(),
            min,
        });
    }
    Ok(())
}

/// Decode the payload on a blocking thread, bounded by `timeout`
///
/// # Errors
/// - `AcquisitionError::Undecodable` when the bytes are not an image
/// - `AcquisitionError::DecodeTimeout` when decoding took too long
pub async fn ensure_decodes(bytes: Bytes, timeout: Duration) -> Result<(), AcquisitionError> {
    let decode = tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes).map(|img| (img.width(), img.height()))
    });

    match tokio::time::timeout(timeout, decode).await {
        Ok(Ok(Ok((width, height)))) => {
            tracing::trace!(width, height, "payload decoded");
            Ok(())
        },
        Ok(Ok(Err(e))) => Err(AcquisitionError::Undecodable(e.to_string())),
        Ok(Err(join_err)) => Err(AcquisitionError::Undecodable(join_err.to_string())),
        Err(_) => Err(AcquisitionError::DecodeTimeout(timeout)),
    }
}
