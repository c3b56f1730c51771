//! Per-request action prediction pipeline.
//!
//! This crate provides:
//! - Deterministic frame index selection
//! - Flow stack assembly with neutral placeholders at the sequence end
//! - Appearance/motion batch building
//! - Top-K aggregation into the response payload
//! - The request pipeline (extraction, flow, batch, inference, aggregation)
//!   with isolated working directories and bounded concurrency

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod selection;
pub mod stack;
pub mod workspace;

pub use aggregate::{aggregate, aggregate_at, top_k};
pub use batch::{build_batch, AppearanceTransform, ChannelMean};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::{Operation, RequestLogger};
pub use pipeline::PredictionPipeline;
pub use selection::{select, SelectionError};
pub use stack::{build_stack, normalize_motion};
pub use workspace::RequestWorkspace;
