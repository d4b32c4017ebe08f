//! Concrete model backends behind the capability traits.
//!
//! ONNX Runtime models for the precision locator and the embedding
//! extractor, and a SeetaFace cascade for the fast preview path.

pub mod onnx;
pub mod seeta;

use thiserror::Error;

pub use onnx::{OnnxEmbeddingExtractor, OnnxFaceLocator};
pub use seeta::SeetaPreviewDetector;

/// Startup-time model loading failure.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}
