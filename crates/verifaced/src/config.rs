use std::path::PathBuf;
use veriface_core::{PreviewParams, DEFAULT_MATCH_THRESHOLD};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Listen address (default: 0.0.0.0).
    pub bind_addr: String,
    /// Listen port; honors the platform-provided `PORT`.
    pub port: u16,
    /// Directory containing the model files.
    pub model_dir: PathBuf,
    /// Embedding distance below which two faces count as the same person.
    pub match_threshold: f32,
    /// Preview detector tuning for the live-count endpoint.
    pub preview: PreviewParams,
    /// Maximum accepted request body size in bytes.
    pub max_payload_bytes: usize,
}

impl Config {
    /// Load configuration from `VERIFACE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("VERIFACE_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_u16("PORT", 5000),
            model_dir: std::env::var("VERIFACE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models")),
            match_threshold: env_f32("VERIFACE_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            preview: PreviewParams {
                scale_factor: env_f32("VERIFACE_PREVIEW_SCALE_FACTOR", 1.3),
                min_neighbors: env_u32("VERIFACE_PREVIEW_MIN_NEIGHBORS", 4),
                min_size: env_u32("VERIFACE_PREVIEW_MIN_SIZE", 30),
            },
            max_payload_bytes: env_usize("VERIFACE_MAX_PAYLOAD_BYTES", 16 * 1024 * 1024),
        }
    }

    /// Path to the face detection model.
    pub fn detection_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the embedding model.
    pub fn embedding_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }

    /// Path to the SeetaFace preview model.
    pub fn preview_model_path(&self) -> PathBuf {
        self.model_dir.join("seeta_fd_frontal_v1.0.bin")
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
