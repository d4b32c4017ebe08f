//! veriface-core — Face-match decision pipeline.
//!
//! Decodes transported photos, locates faces, extracts identity embeddings,
//! and renders a threshold-based match decision with a confidence score.
//! Detection and embedding models are consumed through capability traits so
//! backends can be swapped per deployment (and mocked in tests).

pub mod backend;
pub mod decode;
pub mod engine;
pub mod model;
pub mod pipeline;
pub mod preview;
pub mod types;

pub use engine::{decide, MatchDecision, DEFAULT_MATCH_THRESHOLD};
pub use model::{CapabilityError, EmbeddingExtractor, FaceLocator, ModelContext, PreviewDetector};
pub use pipeline::{verify, FailureKind, VerificationReport};
pub use preview::{count_faces, PreviewParams};
pub use types::{Embedding, FaceRegion};
