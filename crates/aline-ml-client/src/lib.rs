//! Client for the two-stream action classifier service.
//!
//! The classifier is an external model server: it takes an appearance batch
//! `[N, 3, H, W]` and a motion batch `[N, 2K, H, W]` and returns three
//! `[N, numLabels]` probability matrices. Calls from concurrent requests are
//! serialized through an [`InferenceQueue`] so the model sees one batch at a
//! time.

pub mod classifier;
pub mod client;
pub mod error;
pub mod queue;
pub mod types;

pub use classifier::Classifier;
pub use client::{MlClient, MlClientConfig};
pub use error::{MlError, MlResult};
pub use queue::InferenceQueue;
pub use types::{Batch, HealthResponse, InferRequest, InferResponse, InferenceOutput, TensorPayload};
