//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media preprocessing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFmpeg command failed: {message} (exit code {exit_code:?})")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("No frames extracted from {0}")]
    NoFrames(PathBuf),

    #[error("Optical flow failed for transition {index}: {message}")]
    FlowFailed { index: usize, message: String },

    #[error("Image error for {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid frame directory {path}: {message}")]
    InvalidLayout { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a flow failure error for one transition.
    pub fn flow_failed(index: usize, message: impl Into<String>) -> Self {
        Self::FlowFailed {
            index,
            message: message.into(),
        }
    }

    /// Wrap an image error with the path it concerns.
    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid layout error.
    pub fn invalid_layout(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidLayout {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
