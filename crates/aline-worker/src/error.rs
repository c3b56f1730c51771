//! Worker error types.

use thiserror::Error;

use aline_media::MediaError;
use aline_ml_client::MlError;
use aline_models::ModelError;

use crate::selection::SelectionError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Preprocessing failed: {0}")]
    Preprocessing(#[from] MediaError),

    #[error("Inference failed: {0}")]
    Inference(#[from] MlError),

    #[error("Selection failed: {0}")]
    Selection(#[from] SelectionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Parameter or upload errors are the caller's fault; anything else
    /// coming from the model layer is configuration.
    pub fn from_model(err: ModelError) -> Self {
        match err {
            ModelError::InvalidParams(_)
            | ModelError::UnknownRanking(_)
            | ModelError::InvalidUpload(_) => Self::InvalidInput(err.to_string()),
            other => Self::Config(other.to_string()),
        }
    }

    /// Stable machine-readable error category.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::InvalidInput(_) => "invalid_input",
            WorkerError::Preprocessing(_) => "preprocessing",
            WorkerError::Inference(_) => "inference",
            WorkerError::Selection(_) => "selection",
            WorkerError::Config(_) => "config",
            WorkerError::Io(_) | WorkerError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!(WorkerError::invalid_input("x").kind(), "invalid_input");
        assert_eq!(
            WorkerError::from(MediaError::FfmpegNotFound).kind(),
            "preprocessing"
        );
        assert_eq!(WorkerError::from(MlError::QueueClosed).kind(), "inference");
        assert_eq!(
            WorkerError::from(SelectionError::TooFewIndices { requested: 1 }).kind(),
            "selection"
        );
    }

    #[test]
    fn test_from_model() {
        let err = WorkerError::from_model(ModelError::invalid_params("batch_size"));
        assert!(matches!(err, WorkerError::InvalidInput(_)));

        let err = WorkerError::from_model(ModelError::label_line(3, "missing id"));
        assert!(matches!(err, WorkerError::Config(_)));
    }
}
