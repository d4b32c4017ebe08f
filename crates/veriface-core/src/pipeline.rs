//! Verification orchestrator.
//!
//! Composes decode → locate → extract (×2) → decide into one linear,
//! short-circuiting pipeline and renders the API-facing report. Every
//! failure mode is recovered here and surfaced as a structured
//! `success = false` report; nothing propagates past this boundary.

use crate::decode::decode_image;
use crate::engine::{self, MatchDecision};
use crate::model::ModelContext;
use crate::types::{Embedding, FaceRegion};
use image::RgbImage;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Machine-readable failure classification, serialized into the `error`
/// field of a failed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ImageDecodeFailure,
    NoFaceInCandidate,
    NoFaceInReference,
    MultipleFacesInCandidate,
    EmbeddingExtractionFailure,
    InvalidRequest,
    InternalError,
}

/// Terminal output of one verification request. Serialized directly to the
/// response boundary; immutable once constructed.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub success: bool,
    #[serde(rename = "match")]
    pub is_match: bool,
    /// Similarity percentage in [0, 100], reported to 2 decimal places.
    pub similarity: f32,
    /// Raw embedding distance, reported to 4 decimal places. Absent when the
    /// pipeline failed before comparison.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    /// The threshold the decision was made against.
    pub threshold: f32,
    pub message: String,
    /// Faces found in the candidate photo, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_count: Option<usize>,
    /// Faces found in the reference photo, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_face_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureKind>,
}

impl VerificationReport {
    fn matched(
        decision: MatchDecision,
        threshold: f32,
        face_count: usize,
        reference_face_count: usize,
    ) -> Self {
        let message = if decision.is_match {
            "faces match"
        } else {
            "faces do not match"
        };
        Self {
            success: true,
            is_match: decision.is_match,
            similarity: round_to(decision.similarity, 2),
            distance: Some(round_to(decision.distance, 4)),
            threshold,
            message: message.to_string(),
            face_count: Some(face_count),
            reference_face_count: Some(reference_face_count),
            error: None,
        }
    }

    /// A failed report with no counts attached yet.
    pub fn failure(kind: FailureKind, message: impl Into<String>, threshold: f32) -> Self {
        Self {
            success: false,
            is_match: false,
            similarity: 0.0,
            distance: None,
            threshold,
            message: message.into(),
            face_count: None,
            reference_face_count: None,
            error: Some(kind),
        }
    }

    fn with_face_count(mut self, count: usize) -> Self {
        self.face_count = Some(count);
        self
    }

    fn with_reference_face_count(mut self, count: usize) -> Self {
        self.reference_face_count = Some(count);
        self
    }
}

fn round_to(value: f32, places: i32) -> f32 {
    let factor = 10f32.powi(places);
    (value * factor).round() / factor
}

/// Verify that the same person appears in `photo` and `reference_photo`.
///
/// Never panics and never returns an error: any unexpected fault, including
/// a panic out of a model backend, is converted into a generic
/// `internal_error` report.
pub fn verify(
    ctx: &ModelContext,
    photo: &str,
    reference_photo: &str,
    threshold: f32,
) -> VerificationReport {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        run_pipeline(ctx, photo, reference_photo, threshold)
    }));

    match outcome {
        Ok(report) => report,
        Err(_) => {
            tracing::error!("verification pipeline panicked");
            VerificationReport::failure(
                FailureKind::InternalError,
                "internal error during verification",
                threshold,
            )
        }
    }
}

/// The linear pipeline. Each stage is terminal on failure; no partial
/// results are merged and there are no retries.
fn run_pipeline(
    ctx: &ModelContext,
    photo: &str,
    reference_photo: &str,
    threshold: f32,
) -> VerificationReport {
    // 1. Decode both payloads independently.
    let Some(candidate) = decode_image(photo) else {
        return VerificationReport::failure(
            FailureKind::ImageDecodeFailure,
            "could not decode candidate photo",
            threshold,
        );
    };
    let Some(reference) = decode_image(reference_photo) else {
        return VerificationReport::failure(
            FailureKind::ImageDecodeFailure,
            "could not decode reference photo",
            threshold,
        );
    };

    // 2. The candidate photo must contain a face.
    let candidate_faces = match ctx.locator.locate(&candidate) {
        Ok(faces) => faces,
        Err(e) => return internal_failure("candidate face localization", &e.0, threshold),
    };
    tracing::debug!(faces = candidate_faces.len(), "candidate photo located");
    if candidate_faces.is_empty() {
        return VerificationReport::failure(
            FailureKind::NoFaceInCandidate,
            "no face detected in photo",
            threshold,
        )
        .with_face_count(0);
    }

    // 3. So must the reference photo.
    let reference_faces = match ctx.locator.locate(&reference) {
        Ok(faces) => faces,
        Err(e) => return internal_failure("reference face localization", &e.0, threshold),
    };
    tracing::debug!(faces = reference_faces.len(), "reference photo located");
    if reference_faces.is_empty() {
        return VerificationReport::failure(
            FailureKind::NoFaceInReference,
            "no face detected in reference photo",
            threshold,
        )
        .with_face_count(candidate_faces.len())
        .with_reference_face_count(0);
    }

    // 4. Ambiguity about which face to verify is rejected, not resolved:
    //    more than one face in the live capture fails fast.
    if candidate_faces.len() > 1 {
        return VerificationReport::failure(
            FailureKind::MultipleFacesInCandidate,
            "more than one face detected; exactly one face must be visible",
            threshold,
        )
        .with_face_count(candidate_faces.len());
    }

    // 5. One embedding per side. The reference photo may legitimately show
    //    several faces (group photo on file); its first region is used.
    let candidate_embedding =
        match extract_embedding(ctx, &candidate, &candidate_faces[0], "photo", threshold) {
            Ok(embedding) => embedding,
            Err(report) => return report.with_face_count(candidate_faces.len()),
        };
    let reference_embedding = match extract_embedding(
        ctx,
        &reference,
        &reference_faces[0],
        "reference photo",
        threshold,
    ) {
        Ok(embedding) => embedding,
        Err(report) => {
            return report
                .with_face_count(candidate_faces.len())
                .with_reference_face_count(reference_faces.len())
        }
    };

    // Equal length is an extractor contract; a mismatch is an internal
    // fault, not a user-input problem.
    if candidate_embedding.len() != reference_embedding.len() {
        return internal_failure(
            "embedding comparison",
            "embedding length mismatch between extractor calls",
            threshold,
        );
    }

    // 6–7. Decide and assemble.
    let decision = engine::decide(&reference_embedding, &candidate_embedding, threshold);
    tracing::debug!(
        distance = decision.distance,
        similarity = decision.similarity,
        is_match = decision.is_match,
        "match decision"
    );

    VerificationReport::matched(
        decision,
        threshold,
        candidate_faces.len(),
        reference_faces.len(),
    )
}

fn extract_embedding(
    ctx: &ModelContext,
    image: &RgbImage,
    region: &FaceRegion,
    side: &str,
    threshold: f32,
) -> Result<Embedding, VerificationReport> {
    ctx.extractor.extract(image, region).map_err(|e| {
        tracing::error!(side, error = %e, "embedding extraction failed");
        VerificationReport::failure(
            FailureKind::EmbeddingExtractionFailure,
            format!("could not extract face features from {side}"),
            threshold,
        )
    })
}

fn internal_failure(stage: &str, detail: &str, threshold: f32) -> VerificationReport {
    tracing::error!(stage, detail, "verification pipeline fault");
    VerificationReport::failure(
        FailureKind::InternalError,
        "internal error during verification",
        threshold,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CapabilityError, EmbeddingExtractor, FaceLocator, ModelContext, PreviewDetector,
    };
    use crate::preview::PreviewParams;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
    use std::collections::HashMap;
    use std::io::Cursor;

    /// Base64 PNG of the given width; tests key mock behavior off the width.
    fn encoded_image(width: u32) -> String {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            10,
            image::Rgb([128, 128, 128]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        BASE64.encode(buf)
    }

    fn region() -> FaceRegion {
        FaceRegion::new(1, 1, 4, 4)
    }

    /// Locator whose results depend on the image width.
    struct WidthKeyedLocator(HashMap<u32, Vec<FaceRegion>>);

    impl FaceLocator for WidthKeyedLocator {
        fn locate(&self, image: &RgbImage) -> Result<Vec<FaceRegion>, CapabilityError> {
            Ok(self.0.get(&image.width()).cloned().unwrap_or_default())
        }
    }

    /// Extractor whose embedding depends on the image width.
    struct WidthKeyedExtractor(HashMap<u32, Vec<f32>>);

    impl EmbeddingExtractor for WidthKeyedExtractor {
        fn extract(
            &self,
            image: &RgbImage,
            _region: &FaceRegion,
        ) -> Result<Embedding, CapabilityError> {
            self.0
                .get(&image.width())
                .cloned()
                .map(Embedding::new)
                .ok_or_else(|| CapabilityError("no embedding for image".into()))
        }
    }

    struct NoopPreview;

    impl PreviewDetector for NoopPreview {
        fn detect(&self, _gray: &GrayImage, _params: &PreviewParams) -> Vec<FaceRegion> {
            Vec::new()
        }
    }

    fn context(
        locations: &[(u32, usize)],
        embeddings: &[(u32, Vec<f32>)],
    ) -> ModelContext {
        let locator = WidthKeyedLocator(
            locations
                .iter()
                .map(|&(w, n)| (w, vec![region(); n]))
                .collect(),
        );
        let extractor = WidthKeyedExtractor(embeddings.iter().cloned().collect());
        ModelContext::new(Box::new(locator), Box::new(extractor), Box::new(NoopPreview))
    }

    #[test]
    fn test_identical_photo_both_sides_matches() {
        // Scenario: the same one-face photo as candidate and reference.
        let ctx = context(&[(16, 1)], &[(16, vec![0.1, 0.2, 0.3])]);
        let payload = encoded_image(16);

        let report = verify(&ctx, &payload, &payload, 0.50);
        assert!(report.success);
        assert!(report.is_match);
        assert_eq!(report.distance, Some(0.0));
        assert_eq!(report.similarity, 100.0);
        assert_eq!(report.threshold, 0.50);
        assert_eq!(report.face_count, Some(1));
        assert_eq!(report.reference_face_count, Some(1));
        assert!(report.error.is_none());
    }

    #[test]
    fn test_distinct_people_below_threshold() {
        // Embeddings 0.75 apart with threshold 0.50 → no match, similarity 25.
        let ctx = context(
            &[(16, 1), (24, 1)],
            &[(16, vec![0.75, 0.0]), (24, vec![0.0, 0.0])],
        );
        let report = verify(&ctx, &encoded_image(16), &encoded_image(24), 0.50);
        assert!(report.success);
        assert!(!report.is_match);
        assert_eq!(report.distance, Some(0.75));
        assert_eq!(report.similarity, 25.0);
        assert_eq!(report.message, "faces do not match");
    }

    #[test]
    fn test_candidate_decode_failure() {
        let ctx = context(&[(16, 1)], &[(16, vec![0.0])]);
        let report = verify(&ctx, "!!garbage!!", &encoded_image(16), 0.50);
        assert!(!report.success);
        assert_eq!(report.error, Some(FailureKind::ImageDecodeFailure));
        assert!(report.message.contains("candidate"));
        assert!(report.face_count.is_none());
    }

    #[test]
    fn test_reference_decode_failure() {
        let ctx = context(&[(16, 1)], &[(16, vec![0.0])]);
        let report = verify(&ctx, &encoded_image(16), "!!garbage!!", 0.50);
        assert!(!report.success);
        assert_eq!(report.error, Some(FailureKind::ImageDecodeFailure));
        assert!(report.message.contains("reference"));
    }

    #[test]
    fn test_no_face_in_candidate() {
        // Blank candidate: locator finds nothing in the 16px image.
        let ctx = context(&[(16, 0), (24, 1)], &[(24, vec![0.0])]);
        let report = verify(&ctx, &encoded_image(16), &encoded_image(24), 0.50);
        assert!(!report.success);
        assert_eq!(report.error, Some(FailureKind::NoFaceInCandidate));
        assert_eq!(report.face_count, Some(0));
        assert!(report.reference_face_count.is_none());
    }

    #[test]
    fn test_no_face_in_reference_regardless_of_candidate() {
        let ctx = context(&[(16, 1), (24, 0)], &[(16, vec![0.0])]);
        let report = verify(&ctx, &encoded_image(16), &encoded_image(24), 0.50);
        assert!(!report.success);
        assert_eq!(report.error, Some(FailureKind::NoFaceInReference));
        assert_eq!(report.face_count, Some(1));
        assert_eq!(report.reference_face_count, Some(0));
    }

    #[test]
    fn test_multiple_faces_in_candidate_rejected() {
        let ctx = context(&[(16, 2), (24, 1)], &[(24, vec![0.0])]);
        let report = verify(&ctx, &encoded_image(16), &encoded_image(24), 0.50);
        assert!(!report.success);
        assert_eq!(report.error, Some(FailureKind::MultipleFacesInCandidate));
        assert_eq!(report.face_count, Some(2));
    }

    #[test]
    fn test_reference_with_multiple_faces_uses_first_region() {
        // Group photo on file: reference has 3 faces, candidate 1. Accepted.
        let ctx = context(
            &[(16, 1), (24, 3)],
            &[(16, vec![0.1, 0.1]), (24, vec![0.1, 0.1])],
        );
        let report = verify(&ctx, &encoded_image(16), &encoded_image(24), 0.50);
        assert!(report.success);
        assert!(report.is_match);
        assert_eq!(report.reference_face_count, Some(3));
    }

    #[test]
    fn test_embedding_extraction_failure() {
        // Locator accepts the candidate but the extractor has nothing for it.
        let ctx = context(&[(16, 1), (24, 1)], &[(24, vec![0.0])]);
        let report = verify(&ctx, &encoded_image(16), &encoded_image(24), 0.50);
        assert!(!report.success);
        assert_eq!(report.error, Some(FailureKind::EmbeddingExtractionFailure));
        assert!(report.message.contains("photo"));
    }

    #[test]
    fn test_embedding_length_mismatch_is_internal_error() {
        let ctx = context(
            &[(16, 1), (24, 1)],
            &[(16, vec![0.1, 0.2]), (24, vec![0.1, 0.2, 0.3])],
        );
        let report = verify(&ctx, &encoded_image(16), &encoded_image(24), 0.50);
        assert!(!report.success);
        assert_eq!(report.error, Some(FailureKind::InternalError));
    }

    #[test]
    fn test_locator_fault_is_internal_error() {
        struct FaultyLocator;
        impl FaceLocator for FaultyLocator {
            fn locate(&self, _image: &RgbImage) -> Result<Vec<FaceRegion>, CapabilityError> {
                Err(CapabilityError("inference backend exploded".into()))
            }
        }
        let ctx = ModelContext::new(
            Box::new(FaultyLocator),
            Box::new(WidthKeyedExtractor(HashMap::new())),
            Box::new(NoopPreview),
        );
        let report = verify(&ctx, &encoded_image(16), &encoded_image(16), 0.50);
        assert!(!report.success);
        assert_eq!(report.error, Some(FailureKind::InternalError));
    }

    #[test]
    fn test_panicking_backend_is_caught() {
        struct PanickingLocator;
        impl FaceLocator for PanickingLocator {
            fn locate(&self, _image: &RgbImage) -> Result<Vec<FaceRegion>, CapabilityError> {
                panic!("model state corrupted");
            }
        }
        let ctx = ModelContext::new(
            Box::new(PanickingLocator),
            Box::new(WidthKeyedExtractor(HashMap::new())),
            Box::new(NoopPreview),
        );
        let report = verify(&ctx, &encoded_image(16), &encoded_image(16), 0.50);
        assert!(!report.success);
        assert_eq!(report.error, Some(FailureKind::InternalError));
    }

    #[test]
    fn test_report_serialization_shape() {
        let ctx = context(&[(16, 1)], &[(16, vec![0.1])]);
        let payload = encoded_image(16);
        let report = verify(&ctx, &payload, &payload, 0.50);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["match"], true);
        assert_eq!(json["face_count"], 1);
        assert_eq!(json["reference_face_count"], 1);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failure_serialization_shape() {
        let ctx = context(&[(16, 0)], &[]);
        let payload = encoded_image(16);
        let report = verify(&ctx, &payload, &payload, 0.50);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "no_face_in_candidate");
        assert_eq!(json["face_count"], 0);
        assert!(json.get("distance").is_none());
        assert!(json.get("reference_face_count").is_none());
    }

    #[test]
    fn test_rounding_at_the_boundary() {
        let ctx = context(
            &[(16, 1), (24, 1)],
            // distance = sqrt(0.1234567^2) = 0.1234567 → 0.1235 / similarity 87.65
            &[(16, vec![0.123_456_7]), (24, vec![0.0])],
        );
        let report = verify(&ctx, &encoded_image(16), &encoded_image(24), 0.50);
        assert_eq!(report.distance, Some(0.1235));
        assert_eq!(report.similarity, 87.65);
    }
}
