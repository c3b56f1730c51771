//! Model-level error types.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while parsing or validating shared models.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid label mapping at line {line}: {message}")]
    LabelLine { line: usize, message: String },

    #[error("Invalid label mapping: {0}")]
    LabelMapping(String),

    #[error("Invalid pipeline parameters: {0}")]
    InvalidParams(String),

    #[error("Unknown ranking stream: {0}")]
    UnknownRanking(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    /// Create a label line error.
    pub fn label_line(line: usize, message: impl Into<String>) -> Self {
        Self::LabelLine {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid parameters error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Create an invalid upload error.
    pub fn invalid_upload(message: impl Into<String>) -> Self {
        Self::InvalidUpload(message.into())
    }
}
