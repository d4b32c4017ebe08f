use actix_cors::Cors;
use actix_web::{error, web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use veriface_core::backend::{OnnxEmbeddingExtractor, OnnxFaceLocator, SeetaPreviewDetector};
use veriface_core::ModelContext;

mod config;
mod routes;

use config::Config;
use routes::AppState;

/// Map a malformed or incomplete JSON body to the service's structured
/// `invalid_request` shape instead of actix's default error page.
fn handle_json_payload_error(
    err: error::JsonPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    let message = format!("invalid request body: {err}");
    let response = HttpResponse::BadRequest().json(serde_json::json!({
        "success": false,
        "error": "invalid_request",
        "message": message,
    }));
    error::InternalError::from_response(err, response).into()
}

/// Load all three model backends. Fails fast at startup; the models are
/// immutable and shared read-only across requests from here on.
fn build_model_context(config: &Config) -> Result<ModelContext> {
    let locator = OnnxFaceLocator::load(&config.detection_model_path())
        .context("loading face detection model")?;
    let extractor = OnnxEmbeddingExtractor::load(&config.embedding_model_path())
        .context("loading embedding model")?;
    let preview = SeetaPreviewDetector::load(&config.preview_model_path())
        .context("loading preview detection model")?;

    Ok(ModelContext::new(
        Box::new(locator),
        Box::new(extractor),
        Box::new(preview),
    ))
}

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        bind = %config.bind_addr,
        port = config.port,
        threshold = config.match_threshold,
        model_dir = %config.model_dir.display(),
        "verifaced starting"
    );

    let state = AppState {
        ctx: Arc::new(build_model_context(&config)?),
        match_threshold: config.match_threshold,
        preview: config.preview,
    };

    let max_payload = config.max_payload_bytes;
    let server = HttpServer::new(move || {
        App::new()
            // The attendance frontend lives on another origin.
            .wrap(Cors::permissive())
            .app_data(web::Data::new(state.clone()))
            .app_data(
                web::JsonConfig::default()
                    .limit(max_payload)
                    .error_handler(handle_json_payload_error),
            )
            .configure(routes::configure)
    })
    .bind((config.bind_addr.as_str(), config.port))
    .with_context(|| format!("binding {}:{}", config.bind_addr, config.port))?;

    tracing::info!("verifaced ready");
    server.run().await?;
    tracing::info!("verifaced shutting down");

    Ok(())
}
