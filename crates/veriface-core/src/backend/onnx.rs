//! ONNX Runtime backends: SCRFD-style face localization and ArcFace-style
//! embedding extraction.
//!
//! Sessions are loaded once and guarded by a mutex internally so the
//! capability traits can be exercised through `&self` by concurrent
//! requests.

use super::BackendError;
use crate::model::{CapabilityError, EmbeddingExtractor, FaceLocator};
use crate::types::{Embedding, FaceRegion};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;

const DET_INPUT_SIZE: u32 = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_SCORE_THRESHOLD: f32 = 0.5;
const DET_NMS_IOU: f32 = 0.4;
const DET_STRIDES: [u32; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;

const EMB_INPUT_SIZE: u32 = 112;
const EMB_MEAN: f32 = 127.5;
const EMB_STD: f32 = 127.5; // symmetric normalization, unlike the detector
const EMB_DIM: usize = 512;
/// Fraction of the region size added on each side before cropping, so the
/// embedding input keeps some facial context around the tight box.
const EMB_CROP_MARGIN: f32 = 0.2;

fn load_session(model_path: &Path) -> Result<Session, BackendError> {
    if !model_path.exists() {
        return Err(BackendError::ModelNotFound(
            model_path.display().to_string(),
        ));
    }
    let session = Session::builder()?
        .with_intra_threads(2)
        .map_err(ort::Error::from)?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// Internal detection candidate; scores are dropped before regions leave
/// the backend.
struct Candidate {
    region: FaceRegion,
    score: f32,
}

/// SCRFD-style anchor-free face detector.
pub struct OnnxFaceLocator {
    session: Mutex<Session>,
}

impl OnnxFaceLocator {
    pub fn load(model_path: &Path) -> Result<Self, BackendError> {
        let session = load_session(model_path)?;

        let num_outputs = session.outputs().len();
        // Positional output layout: [0-2] = scores, [3-5] = bbox deltas,
        // per stride 8/16/32. Landmark outputs, if present, are ignored.
        if num_outputs < 6 {
            return Err(BackendError::ModelLoad(format!(
                "detection model needs 6 outputs (3 strides × score/bbox), got {num_outputs}"
            )));
        }

        tracing::info!(path = %model_path.display(), outputs = num_outputs, "face detection model loaded");
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Letterbox the image into the square model input, anchored top-left.
    /// Returns the tensor and the resize scale; de-mapping a model
    /// coordinate is a single division by the scale.
    fn preprocess(image: &RgbImage) -> (Array4<f32>, f32) {
        let size = DET_INPUT_SIZE;
        let scale = (size as f32 / image.width() as f32).min(size as f32 / image.height() as f32);
        let new_w = ((image.width() as f32 * scale).round() as u32).clamp(1, size);
        let new_h = ((image.height() as f32 * scale).round() as u32).clamp(1, size);

        let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

        // Zero-initialized tensor = mean-normalized padding.
        let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - DET_MEAN) / DET_STD;
            }
        }

        (tensor, scale)
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn locate(&self, image: &RgbImage) -> Result<Vec<FaceRegion>, CapabilityError> {
        let (tensor, scale) = Self::preprocess(image);

        let mut session = self
            .session
            .lock()
            .map_err(|_| CapabilityError("detector session poisoned".into()))?;

        let input = TensorRef::from_array_view(tensor.view())
            .map_err(|e| CapabilityError(format!("detector input: {e}")))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| CapabilityError(format!("detector inference: {e}")))?;

        let mut candidates = Vec::new();
        for (stride_pos, &stride) in DET_STRIDES.iter().enumerate() {
            let (_, scores) = outputs[stride_pos]
                .try_extract_tensor::<f32>()
                .map_err(|e| CapabilityError(format!("scores stride {stride}: {e}")))?;
            let (_, deltas) = outputs[stride_pos + DET_STRIDES.len()]
                .try_extract_tensor::<f32>()
                .map_err(|e| CapabilityError(format!("bboxes stride {stride}: {e}")))?;

            candidates.extend(decode_stride(
                scores,
                deltas,
                stride,
                scale,
                image.width(),
                image.height(),
            ));
        }

        let kept = nms(candidates, DET_NMS_IOU);
        tracing::debug!(faces = kept.len(), "face localization");
        Ok(kept.into_iter().map(|c| c.region).collect())
    }
}

/// Decode one stride level of anchor-free SCRFD outputs into image-space
/// candidates above the score threshold.
fn decode_stride(
    scores: &[f32],
    deltas: &[f32],
    stride: u32,
    scale: f32,
    image_width: u32,
    image_height: u32,
) -> Vec<Candidate> {
    let grid_w = (DET_INPUT_SIZE / stride) as usize;
    let grid_h = (DET_INPUT_SIZE / stride) as usize;
    let num_anchors = grid_w * grid_h * DET_ANCHORS_PER_CELL;

    let mut candidates = Vec::new();
    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= DET_SCORE_THRESHOLD {
            continue;
        }

        let cell = idx / DET_ANCHORS_PER_CELL;
        let anchor_cx = ((cell % grid_w) as u32 * stride) as f32;
        let anchor_cy = ((cell / grid_w) as u32 * stride) as f32;

        let off = idx * 4;
        if off + 3 >= deltas.len() {
            continue;
        }
        // Deltas are [left, top, right, bottom] distances in stride units.
        let x1 = anchor_cx - deltas[off] * stride as f32;
        let y1 = anchor_cy - deltas[off + 1] * stride as f32;
        let x2 = anchor_cx + deltas[off + 2] * stride as f32;
        let y2 = anchor_cy + deltas[off + 3] * stride as f32;

        if let Some(region) = to_image_region(x1, y1, x2, y2, scale, image_width, image_height) {
            candidates.push(Candidate { region, score });
        }
    }
    candidates
}

/// Map a model-space box back to source pixels and clamp to image bounds.
/// Degenerate boxes collapse to `None`.
fn to_image_region(
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    scale: f32,
    image_width: u32,
    image_height: u32,
) -> Option<FaceRegion> {
    let x1 = (x1 / scale).clamp(0.0, image_width as f32);
    let y1 = (y1 / scale).clamp(0.0, image_height as f32);
    let x2 = (x2 / scale).clamp(0.0, image_width as f32);
    let y2 = (y2 / scale).clamp(0.0, image_height as f32);

    let width = (x2 - x1).floor() as u32;
    let height = (y2 - y1).floor() as u32;
    if width == 0 || height == 0 {
        return None;
    }
    Some(FaceRegion::new(x1 as u32, y1 as u32, width, height))
}

/// Non-maximum suppression; keeps the highest-scoring of overlapping
/// candidates, returned in descending score order.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep
            .iter()
            .all(|kept| iou(&kept.region, &candidate.region) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &FaceRegion, b: &FaceRegion) -> f32 {
    let x1 = a.x.max(b.x) as f32;
    let y1 = a.y.max(b.y) as f32;
    let x2 = (a.x + a.width).min(b.x + b.width) as f32;
    let y2 = (a.y + a.height).min(b.y + b.height) as f32;

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = (a.width * a.height + b.width * b.height) as f32 - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// ArcFace-style embedding extractor over a cropped, resized face region.
pub struct OnnxEmbeddingExtractor {
    session: Mutex<Session>,
}

impl OnnxEmbeddingExtractor {
    pub fn load(model_path: &Path) -> Result<Self, BackendError> {
        let session = load_session(model_path)?;
        tracing::info!(path = %model_path.display(), "embedding model loaded");
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Crop the region (with margin), resize to the model input, and build
    /// a mean/std-normalized NCHW tensor.
    fn preprocess(image: &RgbImage, region: &FaceRegion) -> Array4<f32> {
        let (x, y, w, h) = expand_region(region, image.width(), image.height());
        let crop = image::imageops::crop_imm(image, x, y, w, h).to_image();
        let face = image::imageops::resize(
            &crop,
            EMB_INPUT_SIZE,
            EMB_INPUT_SIZE,
            FilterType::Triangle,
        );

        let size = EMB_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (px, py, pixel) in face.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, py as usize, px as usize]] = (pixel[c] as f32 - EMB_MEAN) / EMB_STD;
            }
        }
        tensor
    }
}

/// Grow a region by the crop margin on every side, clamped to the image.
fn expand_region(region: &FaceRegion, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
    let margin_x = (region.width as f32 * EMB_CROP_MARGIN) as u32;
    let margin_y = (region.height as f32 * EMB_CROP_MARGIN) as u32;

    let x = region.x.saturating_sub(margin_x);
    let y = region.y.saturating_sub(margin_y);
    let right = (region.x + region.width + margin_x).min(image_width);
    let bottom = (region.y + region.height + margin_y).min(image_height);

    let width = right.saturating_sub(x).max(1);
    let height = bottom.saturating_sub(y).max(1);
    (x.min(image_width - 1), y.min(image_height - 1), width, height)
}

impl EmbeddingExtractor for OnnxEmbeddingExtractor {
    fn extract(
        &self,
        image: &RgbImage,
        region: &FaceRegion,
    ) -> Result<Embedding, CapabilityError> {
        let tensor = Self::preprocess(image, region);

        let mut session = self
            .session
            .lock()
            .map_err(|_| CapabilityError("embedding session poisoned".into()))?;

        let input = TensorRef::from_array_view(tensor.view())
            .map_err(|e| CapabilityError(format!("embedding input: {e}")))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| CapabilityError(format!("embedding inference: {e}")))?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| CapabilityError(format!("embedding output: {e}")))?;

        if raw.len() != EMB_DIM {
            return Err(CapabilityError(format!(
                "expected {EMB_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        // L2-normalize so Euclidean distances land in the expected range.
        let norm: f32 = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|v| v / norm).collect()
        } else {
            raw.to_vec()
        };

        Ok(Embedding::new(values))
    }
}
