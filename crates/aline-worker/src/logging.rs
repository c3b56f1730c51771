//! Structured request logging.
//!
//! Every pipeline log line carries the request id and the operation, so one
//! request can be followed across stages.

use tracing::{error, info, warn, Span};
use uuid::Uuid;

/// Pipeline entry point a request went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    PredictVideo,
    PredictImage,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::PredictVideo => "predict_video",
            Operation::PredictImage => "predict_image",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logger bound to one request and operation.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    request_id: String,
    operation: Operation,
}

impl RequestLogger {
    pub fn new(request_id: &Uuid, operation: Operation) -> Self {
        Self {
            request_id: request_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Request started: {}", message
        );
    }

    /// Log completion of one pipeline stage.
    pub fn log_stage(&self, stage: &str, elapsed_ms: u64, message: &str) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            stage,
            elapsed_ms,
            "Stage done: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Request warning: {}", message
        );
    }

    pub fn log_error(&self, kind: &str, message: &str) {
        error!(
            request_id = %self.request_id,
            operation = %self.operation,
            kind,
            "Request failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Request completed: {}", message
        );
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Span covering the whole request.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_logger_creation() {
        let id = Uuid::new_v4();
        let logger = RequestLogger::new(&id, Operation::PredictVideo);

        assert_eq!(logger.request_id(), id.to_string());
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::PredictVideo.to_string(), "predict_video");
        assert_eq!(Operation::PredictImage.as_str(), "predict_image");
    }
}
