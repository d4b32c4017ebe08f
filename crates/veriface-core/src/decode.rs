//! Transported-image decoding.
//!
//! Photos arrive base64-encoded, optionally wrapped in a data URI. The image
//! format is sniffed from the decoded bytes; a claimed media type is never
//! trusted. Malformed input yields `None` rather than an error — a bad photo
//! is a user-input condition, not a fault.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::RgbImage;

/// Decode a transported payload into an RGB8 raster image.
///
/// Returns `None` on invalid base64 or unrecognized/corrupt image bytes.
pub fn decode_image(payload: &str) -> Option<RgbImage> {
    let encoded = strip_data_uri(payload);
    let bytes = BASE64.decode(encoded.trim()).ok()?;
    let decoded = image::load_from_memory(&bytes).ok()?;
    let rgb = decoded.to_rgb8();

    // Decoded images are non-empty by invariant.
    if rgb.width() == 0 || rgb.height() == 0 {
        return None;
    }
    Some(rgb)
}

/// Drop a `data:<mediatype>;base64,` style prefix, up to and including the
/// first comma. Payloads without a data URI scheme pass through untouched.
fn strip_data_uri(payload: &str) -> &str {
    if payload.starts_with("data:") {
        match payload.split_once(',') {
            Some((_, rest)) => rest,
            None => payload,
        }
    } else {
        payload
    }
}
