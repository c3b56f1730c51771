//! Application state.

use std::sync::Arc;

use aline_ml_client::MlClient;
use aline_worker::{PredictionPipeline, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<PredictionPipeline>,
}

impl AppState {
    pub fn new(config: ApiConfig, pipeline: PredictionPipeline) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
        }
    }

    /// Build the pipeline and classifier client from the environment.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_env(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        std::fs::create_dir_all(&config.upload_dir)?;

        let classifier = MlClient::from_env()?;
        let pipeline = PredictionPipeline::new(WorkerConfig::from_env(), Arc::new(classifier))?;

        Ok(Self::new(config, pipeline))
    }
}
