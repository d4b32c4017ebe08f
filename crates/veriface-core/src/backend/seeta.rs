//! SeetaFace cascade backend for the fast preview path (`rustface`).
//!
//! The model is loaded once; `rustface` detectors are not shareable across
//! threads, so a detector is instantiated per call from the cloned model.

use super::BackendError;
use crate::model::PreviewDetector;
use crate::preview::PreviewParams;
use crate::types::FaceRegion;
use image::GrayImage;
use std::io::Cursor;
use std::path::Path;

pub struct SeetaPreviewDetector {
    model: rustface::Model,
}

impl SeetaPreviewDetector {
    pub fn load(model_path: &Path) -> Result<Self, BackendError> {
        if !model_path.exists() {
            return Err(BackendError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }
        let bytes = std::fs::read(model_path)
            .map_err(|e| BackendError::ModelLoad(format!("{}: {e}", model_path.display())))?;
        let model = rustface::read_model(Cursor::new(bytes))
            .map_err(|e| BackendError::ModelLoad(format!("{}: {e}", model_path.display())))?;

        tracing::info!(path = %model_path.display(), "preview detection model loaded");
        Ok(Self { model })
    }
}

impl PreviewDetector for SeetaPreviewDetector {
    fn detect(&self, gray: &GrayImage, params: &PreviewParams) -> Vec<FaceRegion> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(params.min_size);
        // SeetaFace walks the pyramid downward; invert the step factor.
        detector.set_pyramid_scale_factor(1.0 / params.scale_factor);
        detector.set_score_thresh(f64::from(params.min_neighbors));
        detector.set_slide_window_step(4, 4);

        let faces =
            detector.detect(&rustface::ImageData::new(gray.as_raw(), gray.width(), gray.height()));

        faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceRegion::new(
                    bbox.x().max(0) as u32,
                    bbox.y().max(0) as u32,
                    bbox.width(),
                    bbox.height(),
                )
            })
            .collect()
    }
}
