//! Prediction payload returned to clients.
//!
//! The JSON shape is consumed directly by the timeline UI:
//!
//! ```json
//! {
//!   "media": { "url": "/videos/clip.webm?cachebuster=1700000000.123456" },
//!   "frames": [
//!     { "frameNumber": 0, "predictions": [ { "label": "Archery", "prob": 0.91 } ] }
//!   ]
//! }
//! ```

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Query parameter appended to media URLs to defeat client-side caching.
pub const CACHEBUSTER_PARAM: &str = "cachebuster";

/// A single label with its probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LabelPrediction {
    /// Human-readable label name
    pub label: String,
    /// Probability as produced by the classifier (not re-normalized)
    pub prob: f32,
}

impl LabelPrediction {
    pub fn new(label: impl Into<String>, prob: f32) -> Self {
        Self {
            label: label.into(),
            prob,
        }
    }
}

/// Ranked predictions for one selected frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FramePrediction {
    /// Row index in the batch (0-based, selection order)
    pub frame_number: usize,
    /// Top-K predictions, highest probability first
    pub predictions: Vec<LabelPrediction>,
}

/// Reference to the media the predictions describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MediaRef {
    pub url: String,
}

impl MediaRef {
    /// Build a media reference decorated with a freshness token derived from `now`.
    pub fn with_cachebuster(url: impl AsRef<str>, now: DateTime<Utc>) -> Self {
        let url = url.as_ref();
        let separator = if url.contains('?') { '&' } else { '?' };
        Self {
            url: format!(
                "{}{}{}={}",
                url,
                separator,
                CACHEBUSTER_PARAM,
                cachebuster_token(now)
            ),
        }
    }

    /// Extract the cachebuster token, if present.
    pub fn cachebuster(&self) -> Option<&str> {
        let (_, query) = self.url.split_once('?')?;
        query.split('&').find_map(|pair| {
            pair.strip_prefix(CACHEBUSTER_PARAM)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }
}

/// Unix seconds with a microsecond fraction, e.g. `1700000000.123456`.
pub fn cachebuster_token(now: DateTime<Utc>) -> String {
    format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros())
}

/// Complete prediction result for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PredictionResult {
    pub media: MediaRef,
    pub frames: Vec<FramePrediction>,
}

impl PredictionResult {
    /// Number of frame entries.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
