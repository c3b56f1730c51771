//! Worker configuration.

use std::path::PathBuf;

use aline_models::{InputShape, RankingStream};

/// Pipeline configuration shared by every request.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root for per-request working directories
    pub work_dir: PathBuf,
    /// Maximum requests inside the pipeline at once
    pub max_concurrent_requests: usize,
    /// Threads in the flow/batch pool (0 = available cores)
    pub flow_workers: usize,
    /// Pending inference jobs before submitters wait
    pub inference_queue_capacity: usize,
    /// Label mapping file (`<name> <id>` per line)
    pub label_mapping_path: PathBuf,
    /// Optional JSON channel mean; the built-in BGR mean is used when unset
    pub channel_mean_path: Option<PathBuf>,
    /// Classifier spatial input
    pub input_shape: InputShape,
    /// Probability matrix used for ranking
    pub ranking: RankingStream,
    /// Flow backend name (`farneback`, or `opencv` when built with it)
    pub flow_backend: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/aline"),
            max_concurrent_requests: 2,
            flow_workers: 0,
            inference_queue_capacity: 8,
            label_mapping_path: PathBuf::from("labels.txt"),
            channel_mean_path: None,
            input_shape: InputShape::default(),
            ranking: RankingStream::default(),
            flow_backend: "farneback".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("ALINE_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            max_concurrent_requests: std::env::var("ALINE_MAX_REQUESTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_requests),
            flow_workers: std::env::var("ALINE_FLOW_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.flow_workers),
            inference_queue_capacity: std::env::var("ALINE_INFERENCE_QUEUE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.inference_queue_capacity),
            label_mapping_path: std::env::var("ALINE_LABEL_MAPPING")
                .map(PathBuf::from)
                .unwrap_or(defaults.label_mapping_path),
            channel_mean_path: std::env::var("ALINE_CHANNEL_MEAN").ok().map(PathBuf::from),
            input_shape: InputShape::new(
                std::env::var("ALINE_INPUT_HEIGHT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.input_shape.height),
                std::env::var("ALINE_INPUT_WIDTH")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.input_shape.width),
            ),
            ranking: std::env::var("ALINE_RANKING")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.ranking),
            flow_backend: std::env::var("ALINE_FLOW_BACKEND").unwrap_or(defaults.flow_backend),
        }
    }

    /// Number of threads for the CPU pool.
    pub fn pool_threads(&self) -> usize {
        if self.flow_workers > 0 {
            self.flow_workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_requests, 2);
        assert_eq!(config.input_shape, InputShape::new(224, 224));
        assert_eq!(config.ranking, RankingStream::Appearance);
        assert!(config.channel_mean_path.is_none());
    }

    #[test]
    fn test_pool_threads() {
        let mut config = WorkerConfig::default();
        assert!(config.pool_threads() >= 1);
        config.flow_workers = 3;
        assert_eq!(config.pool_threads(), 3);
    }
}
