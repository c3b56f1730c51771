//! Shared data models for the ActionLine backend.
//!
//! This crate provides Serde-serializable types for:
//! - The per-frame prediction payload returned to clients
//! - Label mappings (label id to human-readable name)
//! - Per-call pipeline parameters and ranking strategy
//! - Upload classification and filename sanitization

pub mod error;
pub mod labels;
pub mod params;
pub mod prediction;
pub mod upload;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use labels::LabelMapping;
pub use params::{InputShape, PipelineParams, RankingStream};
pub use prediction::{FramePrediction, LabelPrediction, MediaRef, PredictionResult};
pub use upload::{sanitize_filename, UploadKind};
