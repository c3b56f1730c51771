//! Per-call pipeline parameters.
//!
//! Every value here travels with a single request. Nothing is stored in
//! process-wide state, so concurrent requests never observe each other's
//! batch or window sizes.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ModelError, ModelResult};

/// Batch size for video requests.
pub const VIDEO_BATCH_SIZE: usize = 16;
/// Batch size for still-image requests.
pub const IMAGE_BATCH_SIZE: usize = 2;
/// Number of consecutive flow transitions per motion tensor.
pub const FLOW_WINDOW: usize = 10;
/// Frame sampling rate for extraction.
pub const SAMPLE_FPS: u32 = 15;
/// Square crop applied at extraction.
pub const CROP_SIZE: u32 = 224;
/// Labels reported per frame.
pub const TOP_K: usize = 5;
/// Default classifier spatial input.
pub const INPUT_SIZE: usize = 224;

/// Which classifier output drives the per-frame ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RankingStream {
    /// Appearance-only stream (still frames).
    #[default]
    Appearance,
    /// Motion-only stream (flow stacks).
    Motion,
    /// Fused two-stream output.
    Combined,
}

impl RankingStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingStream::Appearance => "appearance",
            RankingStream::Motion => "motion",
            RankingStream::Combined => "combined",
        }
    }
}

impl fmt::Display for RankingStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RankingStream {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "appearance" | "frames" | "spatial" => Ok(RankingStream::Appearance),
            "motion" | "flow" => Ok(RankingStream::Motion),
            "combined" | "fusion" => Ok(RankingStream::Combined),
            other => Err(ModelError::UnknownRanking(other.to_string())),
        }
    }
}

/// Spatial input shape shared by both classifier streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InputShape {
    pub height: usize,
    pub width: usize,
}

impl InputShape {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }
}

impl Default for InputShape {
    fn default() -> Self {
        Self::new(INPUT_SIZE, INPUT_SIZE)
    }
}

/// Parameters threaded explicitly through one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct PipelineParams {
    /// Number of frames selected and sent to the classifier
    #[validate(range(min = 2, max = 256))]
    pub batch_size: usize,
    /// Flow transitions stacked per motion tensor (K)
    #[validate(range(min = 1, max = 64))]
    pub window: usize,
    /// Extraction sampling rate (frames/second)
    #[validate(range(min = 1, max = 120))]
    pub fps: u32,
    /// Square crop size at extraction
    #[validate(range(min = 16, max = 4096))]
    pub crop_size: u32,
    /// Labels kept per frame
    #[validate(range(min = 1))]
    pub top_k: usize,
    /// Ranking source
    #[serde(default)]
    pub ranking: RankingStream,
}

impl PipelineParams {
    /// Defaults for video requests.
    pub fn video() -> Self {
        Self {
            batch_size: VIDEO_BATCH_SIZE,
            window: FLOW_WINDOW,
            fps: SAMPLE_FPS,
            crop_size: CROP_SIZE,
            top_k: TOP_K,
            ranking: RankingStream::default(),
        }
    }

    /// Defaults for still-image requests.
    pub fn image() -> Self {
        Self {
            batch_size: IMAGE_BATCH_SIZE,
            ..Self::video()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_ranking(mut self, ranking: RankingStream) -> Self {
        self.ranking = ranking;
        self
    }

    /// Validate ranges, mapping failures into a model error.
    pub fn check(&self) -> ModelResult<()> {
        self.validate()
            .map_err(|e| ModelError::invalid_params(e.to_string()))
    }
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self::video()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let video = PipelineParams::video();
        assert_eq!(video.batch_size, 16);
        assert_eq!(video.window, 10);
        assert_eq!(video.fps, 15);
        assert_eq!(video.crop_size, 224);
        assert_eq!(video.ranking, RankingStream::Appearance);
        assert!(video.check().is_ok());

        let image = PipelineParams::image();
        assert_eq!(image.batch_size, 2);
        assert_eq!(image.window, video.window);
    }

    #[test]
    fn test_rejects_small_batch() {
        let params = PipelineParams::video().with_batch_size(1);
        assert!(params.check().is_err());
    }

    #[test]
    fn test_rejects_zero_window() {
        let params = PipelineParams::video().with_window(0);
        assert!(params.check().is_err());
    }

    #[test]
    fn test_ranking_from_str() {
        assert_eq!("appearance".parse::<RankingStream>().unwrap(), RankingStream::Appearance);
        assert_eq!("FLOW".parse::<RankingStream>().unwrap(), RankingStream::Motion);
        assert_eq!("combined".parse::<RankingStream>().unwrap(), RankingStream::Combined);
        assert!("bogus".parse::<RankingStream>().is_err());
    }
}
