//! Fast face-presence counting for live preview.
//!
//! Shares the ingestion path with verification but favors speed and recall
//! over precision; it is never used for identity decisions.

use crate::model::PreviewDetector;
use crate::types::FaceRegion;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Tunable configuration for the preview detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PreviewParams {
    /// Scale step between detection pyramid levels.
    pub scale_factor: f32,
    /// Minimum neighbor agreement for an accepted region.
    pub min_neighbors: u32,
    /// Minimum accepted region edge, in source pixels (square).
    pub min_size: u32,
}

impl Default for PreviewParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.3,
            min_neighbors: 4,
            min_size: 30,
        }
    }
}

/// Count face-like regions in a decoded image.
///
/// Converts to a single intensity channel, runs the preview detector, and
/// drops regions below the configured minimum size. Never fails: an image
/// with no detectable faces yields an empty sequence.
pub fn count_faces(
    detector: &dyn PreviewDetector,
    image: &RgbImage,
    params: &PreviewParams,
) -> Vec<FaceRegion> {
    let gray = image::imageops::grayscale(image);
    let mut regions = detector.detect(&gray, params);
    regions.retain(|r| r.width >= params.min_size && r.height >= params.min_size);

    tracing::debug!(
        width = image.width(),
        height = image.height(),
        faces = regions.len(),
        "preview detection"
    );
    regions
}
