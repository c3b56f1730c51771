//! Single-consumer inference queue.
//!
//! One background task owns the classifier and handles jobs strictly in
//! arrival order, so overlapping requests never reach the model at the same
//! time. A full queue makes `submit` wait.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::classifier::Classifier;
use crate::error::{MlError, MlResult};
use crate::types::{Batch, InferenceOutput};

struct InferenceJob {
    batch: Batch,
    reply: oneshot::Sender<MlResult<InferenceOutput>>,
}

/// Handle for submitting batches to the shared classifier.
#[derive(Clone)]
pub struct InferenceQueue {
    tx: mpsc::Sender<InferenceJob>,
    num_labels: usize,
}

impl InferenceQueue {
    /// Spawn the consumer task on the current runtime.
    ///
    /// Every output is validated against `num_labels` before it is returned.
    pub fn spawn(classifier: Arc<dyn Classifier>, capacity: usize, num_labels: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(consume(classifier, rx, num_labels));
        info!(capacity, num_labels, "Inference queue started");
        Self { tx, num_labels }
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// Queue a batch and wait for its validated output.
    pub async fn submit(&self, batch: Batch) -> MlResult<InferenceOutput> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(InferenceJob { batch, reply })
            .await
            .map_err(|_| MlError::QueueClosed)?;
        rx.await.map_err(|_| MlError::QueueClosed)?
    }
}

async fn consume(
    classifier: Arc<dyn Classifier>,
    mut rx: mpsc::Receiver<InferenceJob>,
    num_labels: usize,
) {
    while let Some(job) = rx.recv().await {
        let start = Instant::now();
        let rows = job.batch.len();

        let result = classifier
            .infer(&job.batch)
            .await
            .and_then(|out| out.validate(rows, num_labels).map(|_| out));

        match &result {
            Ok(_) => debug!(rows, elapsed_ms = start.elapsed().as_millis() as u64, "Inference complete"),
            Err(e) => warn!(rows, error = %e, "Inference failed"),
        }

        if job.reply.send(result).is_err() {
            debug!("Inference caller went away before the reply");
        }
    }
    debug!("Inference queue closed");
}
