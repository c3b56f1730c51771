//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use aline_worker::WorkerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Prediction timed out after {0}s")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The upload was missing, misnamed, or had a rejected extension.
    pub fn invalid_file() -> Self {
        Self::BadRequest("Invalid file".to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Preprocessing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Inference(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error category.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "invalid_input",
            ApiError::NotFound(_) => "not_found",
            ApiError::Preprocessing(_) => "preprocessing",
            ApiError::Inference(_) => "inference",
            ApiError::Timeout(_) => "timeout",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::InvalidInput(msg) => ApiError::BadRequest(msg),
            WorkerError::Preprocessing(_) | WorkerError::Selection(_) => {
                ApiError::Preprocessing(err.to_string())
            }
            WorkerError::Inference(_) => ApiError::Inference(err.to_string()),
            WorkerError::Config(_) | WorkerError::Io(_) | WorkerError::Internal(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let error = match &self {
            ApiError::Internal(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            error,
            kind: self.kind(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aline_media::MediaError;
    use aline_ml_client::MlError;

    #[test]
    fn test_worker_error_mapping() {
        let cases = [
            (WorkerError::invalid_input("too short"), StatusCode::BAD_REQUEST),
            (
                WorkerError::from(MediaError::NoFrames("frames".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (WorkerError::from(MlError::QueueClosed), StatusCode::BAD_GATEWAY),
            (WorkerError::config_error("labels"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_invalid_input_keeps_reason() {
        let err = ApiError::from(WorkerError::invalid_input("video too short"));
        assert_eq!(err.to_string(), "video too short");
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn test_timeout_status() {
        assert_eq!(ApiError::Timeout(30).status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}
