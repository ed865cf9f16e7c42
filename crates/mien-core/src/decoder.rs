//! Base64 image payload decoding.
//!
//! Accepts raw base64 or a data-URI (`data:image/png;base64,<payload>`);
//! everything up to and including the first comma is treated as metadata
//! and stripped before decoding.

use base64::Engine;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unrecognized image container: {0}")]
    Container(#[from] image::ImageError),
    #[error("decoded image has zero width or height")]
    EmptyImage,
}

/// Decode an (optionally data-URI-prefixed) base64 string into an RGB image.
///
/// Pure and idempotent: the same payload always yields pixel-identical
/// output. Failures surface as [`DecodeError`]; callers map them to a
/// request-level error result rather than propagating a fault.
pub fn decode_base64_image(payload: &str) -> Result<RgbImage, DecodeError> {
    let encoded = match payload.split_once(',') {
        Some((_meta, data)) => data,
        None => payload,
    };

    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
    decode_image_bytes(&bytes)
}

/// Decode raw container bytes (PNG/JPEG/...) into an RGB image.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    let img = image::load_from_memory(bytes)?.to_rgb8();
    if img.width() == 0 || img.height() == 0 {
        return Err(DecodeError::EmptyImage);
    }
    Ok(img)
}
