//! Capability contracts for the detection and embedding models.
//!
//! The orchestrator never talks to a model directly; it goes through these
//! traits so any backend (ONNX, SeetaFace, a test stub) can be substituted.
//! Loaded models are immutable and shared read-only across in-flight
//! requests — implementations must be `Send + Sync` and take `&self`.

use crate::preview::PreviewParams;
use crate::types::{Embedding, FaceRegion};
use image::{GrayImage, RgbImage};
use thiserror::Error;

/// Fault inside a model backend. Not a user-input condition: the pipeline
/// treats these as internal errors, never as "no face" or "bad photo".
#[derive(Error, Debug)]
#[error("{0}")]
pub struct CapabilityError(pub String);

/// Higher-precision face localization, suitable for feeding identity
/// extraction. Must support zero, one, or many results.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, image: &RgbImage) -> Result<Vec<FaceRegion>, CapabilityError>;
}

/// Identity embedding extraction for one face region.
///
/// Deterministic for a fixed image+region pair and model version. The region
/// must come from a locator call on the same image; behavior is undefined for
/// out-of-bounds regions.
pub trait EmbeddingExtractor: Send + Sync {
    fn extract(&self, image: &RgbImage, region: &FaceRegion)
        -> Result<Embedding, CapabilityError>;
}

/// Low-cost, high-recall detector for the live-preview counting path.
/// Never fails: a decoded image always yields a (possibly empty) result.
pub trait PreviewDetector: Send + Sync {
    fn detect(&self, gray: &GrayImage, params: &PreviewParams) -> Vec<FaceRegion>;
}

/// The process-wide model state, constructed once at startup and shared
/// read-only across all requests.
pub struct ModelContext {
    pub locator: Box<dyn FaceLocator>,
    pub extractor: Box<dyn EmbeddingExtractor>,
    pub preview: Box<dyn PreviewDetector>,
}

impl ModelContext {
    pub fn new(
        locator: Box<dyn FaceLocator>,
        extractor: Box<dyn EmbeddingExtractor>,
        preview: Box<dyn PreviewDetector>,
    ) -> Self {
        Self {
            locator,
            extractor,
            preview,
        }
    }
}
