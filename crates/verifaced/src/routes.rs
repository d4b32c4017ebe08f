use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use veriface_core::{pipeline, preview, FailureKind, ModelContext, PreviewParams, VerificationReport};

/// Application state shared across all handlers. Models are read-only;
/// every request gets its own decoded images and embeddings.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<ModelContext>,
    pub match_threshold: f32,
    pub preview: PreviewParams,
}

/// Configure all service routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/health", web::get().to(health))
        .route("/api/detect-face-frame", web::post().to(detect_face_frame))
        .route("/api/validate-face", web::post().to(validate_face));
}

#[derive(Debug, Deserialize)]
pub struct FrameRequest {
    pub frame: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub photo: String,
    pub reference_photo: String,
    /// Optional per-deployment override; defaults to the configured value.
    pub threshold: Option<f32>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    success: bool,
    status: &'static str,
    message: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct FramePreviewResponse {
    success: bool,
    face_detected: bool,
    face_count: usize,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<FailureKind>,
}

/// Health check endpoint.
async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        success: true,
        status: "running",
        message: "veriface verification service is running",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Fast face-presence counting for live preview frames.
///
/// A frame that cannot be decoded is a `success=false` body, not an HTTP
/// error; the caller renders feedback either way.
async fn detect_face_frame(
    state: web::Data<AppState>,
    req: web::Json<FrameRequest>,
) -> impl Responder {
    let state = state.into_inner();
    let frame = req.into_inner().frame;

    let response = web::block(move || count_frame(&state, &frame)).await;
    match response {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(e) => {
            tracing::error!(error = %e, "preview task failed");
            HttpResponse::InternalServerError().json(FramePreviewResponse {
                success: false,
                face_detected: false,
                face_count: 0,
                message: "internal error".to_string(),
                error: Some(FailureKind::InternalError),
            })
        }
    }
}

fn count_frame(state: &AppState, frame: &str) -> FramePreviewResponse {
    let Some(image) = veriface_core::decode::decode_image(frame) else {
        return FramePreviewResponse {
            success: false,
            face_detected: false,
            face_count: 0,
            message: "could not decode frame".to_string(),
            error: Some(FailureKind::ImageDecodeFailure),
        };
    };

    let regions = preview::count_faces(state.ctx.preview.as_ref(), &image, &state.preview);
    let count = regions.len();
    FramePreviewResponse {
        success: true,
        face_detected: count > 0,
        face_count: count,
        message: if count > 0 {
            format!("{count} face(s) detected")
        } else {
            "no face detected".to_string()
        },
        error: None,
    }
}

/// Verify a live-captured photo against the stored reference photo.
async fn validate_face(
    state: web::Data<AppState>,
    req: web::Json<ValidateRequest>,
) -> impl Responder {
    let state = state.into_inner();
    let req = req.into_inner();
    let threshold = req.threshold.unwrap_or(state.match_threshold);

    let report = web::block(move || {
        pipeline::verify(&state.ctx, &req.photo, &req.reference_photo, threshold)
    })
    .await;

    match report {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => {
            tracing::error!(error = %e, "verification task failed");
            HttpResponse::InternalServerError().json(VerificationReport::failure(
                FailureKind::InternalError,
                "verification task failed",
                threshold,
            ))
        }
    }
}
