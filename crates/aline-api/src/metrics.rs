//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "aline_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "aline_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "aline_http_requests_in_flight";

    // Upload metrics
    pub const UPLOADS_TOTAL: &str = "aline_uploads_total";
    pub const UPLOAD_BYTES: &str = "aline_upload_bytes";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an upload by kind and outcome (`accepted` or `rejected`).
pub fn record_upload(kind: &str, outcome: &str, bytes: usize) {
    let labels = [("kind", kind.to_string()), ("outcome", outcome.to_string())];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
    if bytes > 0 {
        histogram!(names::UPLOAD_BYTES, "kind" => kind.to_string()).record(bytes as f64);
    }
}

/// Collapse per-file and per-id paths so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    if path.starts_with("/videos/") {
        return "/videos/*path".to_string();
    }
    if let Some(id) = path.strip_prefix("/api/example/") {
        if !id.is_empty() {
            return "/api/example/:id".to_string();
        }
    }
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
