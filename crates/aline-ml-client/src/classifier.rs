//! Classifier abstraction.

use async_trait::async_trait;

use crate::error::MlResult;
use crate::types::{Batch, InferenceOutput};

/// A two-stream action classifier.
///
/// Implementations may hold stateful resources (a model server connection, a
/// loaded network); callers reach them through an
/// [`InferenceQueue`](crate::InferenceQueue) so calls never overlap.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Run both streams over `batch`. Output is unvalidated.
    async fn infer(&self, batch: &Batch) -> MlResult<InferenceOutput>;

    /// Whether the classifier can currently serve requests.
    async fn is_ready(&self) -> bool;
}
