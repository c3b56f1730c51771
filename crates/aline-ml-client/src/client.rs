//! ML service HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::classifier::Classifier;
use crate::error::{MlError, MlResult};
use crate::types::{Batch, HealthResponse, InferRequest, InferResponse, InferenceOutput};

/// Configuration for ML client.
#[derive(Debug, Clone)]
pub struct MlClientConfig {
    /// Base URL of ML service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries (0 = a single attempt)
    pub max_retries: u32,
}

impl Default for MlClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 0,
        }
    }
}

impl MlClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("ML_SERVICE_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("ML_SERVICE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("ML_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

/// HTTP client for the classifier service.
pub struct MlClient {
    http: Client,
    config: MlClientConfig,
}

impl MlClient {
    /// Create a new ML client.
    pub fn new(config: MlClientConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(MlClientConfig::from_env())
    }

    pub fn config(&self) -> &MlClientConfig {
        &self.config
    }

    /// Check if ML service is healthy.
    pub async fn health_check(&self) -> MlResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("ML service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("ML service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Post a batch to `/infer` and decode the three probability matrices.
    pub async fn infer_batch(&self, batch: &Batch) -> MlResult<InferenceOutput> {
        let url = format!("{}/infer", self.config.base_url);
        let request = InferRequest::from(batch);

        debug!(rows = batch.len(), window = batch.window(), "Sending inference request to {}", url);

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| self.map_transport(e))?;

                if response.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
                    return Err(MlError::ServiceUnavailable(url.clone()));
                }
                Ok(response)
            })
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MlError::RequestFailed(format!(
                "ML service returned {}: {}",
                status, body
            )));
        }

        let body = response.text().await?;
        let decoded: InferResponse = serde_json::from_str(&body)
            .map_err(|e| MlError::InvalidResponse(format!("undecodable /infer body: {e}")))?;
        InferenceOutput::try_from(decoded)
    }

    fn map_transport(&self, e: reqwest::Error) -> MlError {
        if e.is_timeout() {
            MlError::Timeout(self.config.timeout.as_secs())
        } else {
            MlError::Network(e)
        }
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "ML request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(MlError::RequestFailed("Unknown error".to_string())))
    }
}

#[async_trait]
impl Classifier for MlClient {
    async fn infer(&self, batch: &Batch) -> MlResult<InferenceOutput> {
        self.infer_batch(batch).await
    }

    async fn is_ready(&self) -> bool {
        self.health_check().await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, max_retries: u32) -> MlClient {
        MlClient::new(MlClientConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
            max_retries,
        })
        .unwrap()
    }

    fn batch() -> Batch {
        Batch::new(
            vec![0, 1],
            Array4::zeros((2, 3, 2, 2)),
            Array4::zeros((2, 4, 2, 2)),
        )
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = MlClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8001");
        assert_eq!(config.max_retries, 0);
    }

    #[tokio::test]
    async fn test_infer_decodes_matrices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/infer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "prob": [[0.5, 0.5], [0.25, 0.75]],
                "frames_prob": [[0.9, 0.1], [0.2, 0.8]],
                "flow_prob": [[0.1, 0.9], [0.3, 0.7]],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = client_for(&server, 0).infer(&batch()).await.unwrap();
        assert_eq!(out.appearance.dim(), (2, 2));
        assert!((out.appearance[[0, 0]] - 0.9).abs() < 1e-6);
        out.validate(2, 2).unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_request_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/infer"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;

        let err = client_for(&server, 0).infer(&batch()).await.unwrap_err();
        match err {
            MlError::RequestFailed(msg) => assert!(msg.contains("model crashed")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unavailable_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/infer"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let err = client_for(&server, 1).infer(&batch()).await.unwrap_err();
        assert!(matches!(err, MlError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_garbage_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/infer"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server, 0).infer(&batch()).await.unwrap_err();
        assert!(matches!(err, MlError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let client = client_for(&server, 0);
        assert!(client.health_check().await.unwrap());
        assert!(client.is_ready().await);
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let client = MlClient::new(MlClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(1),
            max_retries: 0,
        })
        .unwrap();
        assert!(!client.is_ready().await);
    }
}
