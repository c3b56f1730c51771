//! Media preprocessing for the ActionLine prediction pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with structured failure reporting
//! - Frame extraction into numbered, naturally sorted frame directories
//! - Dense optical flow (Farneback) between consecutive frames
//! - 8-bit flow quantization and the `X<NNN>`/`Y<NNN>` flow layout
//! - Working-directory cleanup that reports every failure

pub mod command;
pub mod error;
pub mod flow;
pub mod frames;
pub mod fs_utils;
pub mod imaging;
pub mod progress;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegOutcome, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use flow::{
    compute_flows, dequantize, quantize, Farneback, FarnebackParams, FlowEstimator, FlowField,
    FlowFieldSet, FlowPair, LoadedFlows, NEUTRAL_FLOW_PIXEL,
};
#[cfg(feature = "opencv")]
pub use flow::OpenCvFarneback;
pub use frames::{extract_frames, FrameSequence, FRAME_PATTERN};
pub use fs_utils::{clear_dir, prepare_empty_dir, remove_dir, CleanupReport};
pub use progress::FfmpegProgress;
