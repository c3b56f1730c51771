//! Classifier input/output types and their wire format.

use ndarray::{Array2, Array4};
use serde::{Deserialize, Serialize};

use crate::error::{MlError, MlResult};

/// Tolerance on the sum of a probability row.
pub const ROW_SUM_TOLERANCE: f32 = 1e-3;

/// Appearance and motion tensors for one request, aligned row by row.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Frame indices each row was built from
    indices: Vec<usize>,
    /// `[N, 3, H, W]`
    appearance: Array4<f32>,
    /// `[N, 2K, H, W]`
    motion: Array4<f32>,
}

impl Batch {
    pub fn new(
        indices: Vec<usize>,
        appearance: Array4<f32>,
        motion: Array4<f32>,
    ) -> MlResult<Self> {
        let (n, c, h, w) = appearance.dim();
        let (mn, mc, mh, mw) = motion.dim();

        if n != indices.len() || mn != indices.len() {
            return Err(MlError::shape_mismatch(format!(
                "{} indices but {} appearance rows and {} motion rows",
                indices.len(),
                n,
                mn
            )));
        }
        if c != 3 {
            return Err(MlError::shape_mismatch(format!(
                "appearance has {c} channels, expected 3"
            )));
        }
        if mc == 0 || mc % 2 != 0 {
            return Err(MlError::shape_mismatch(format!(
                "motion has {mc} channels, expected an even positive count"
            )));
        }
        if (h, w) != (mh, mw) {
            return Err(MlError::shape_mismatch(format!(
                "appearance is {h}x{w} but motion is {mh}x{mw}"
            )));
        }

        Ok(Self {
            indices,
            appearance,
            motion,
        })
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn appearance(&self) -> &Array4<f32> {
        &self.appearance
    }

    pub fn motion(&self) -> &Array4<f32> {
        &self.motion
    }

    /// Temporal window `K` (half the motion channel count).
    pub fn window(&self) -> usize {
        self.motion.dim().1 / 2
    }
}

/// Dense tensor on the wire: shape plus row-major data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorPayload {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorPayload {
    pub fn from_array(array: &Array4<f32>) -> Self {
        let (n, c, h, w) = array.dim();
        Self {
            shape: vec![n, c, h, w],
            data: array.iter().copied().collect(),
        }
    }
}

/// Request body for `POST /infer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferRequest {
    pub appearance: TensorPayload,
    pub motion: TensorPayload,
}

impl From<&Batch> for InferRequest {
    fn from(batch: &Batch) -> Self {
        Self {
            appearance: TensorPayload::from_array(batch.appearance()),
            motion: TensorPayload::from_array(batch.motion()),
        }
    }
}

/// Response body of `POST /infer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferResponse {
    /// Two-stream combined probabilities
    pub prob: Vec<Vec<f32>>,
    /// Appearance-stream probabilities
    pub frames_prob: Vec<Vec<f32>>,
    /// Motion-stream probabilities
    pub flow_prob: Vec<Vec<f32>>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}

/// Three `[N, numLabels]` probability matrices from one inference call.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutput {
    pub combined: Array2<f32>,
    pub appearance: Array2<f32>,
    pub motion: Array2<f32>,
}

impl InferenceOutput {
    /// Check every matrix is `[rows, labels]` with finite, non-negative rows
    /// summing to one.
    pub fn validate(&self, rows: usize, labels: usize) -> MlResult<()> {
        for (name, m) in [
            ("combined", &self.combined),
            ("appearance", &self.appearance),
            ("motion", &self.motion),
        ] {
            if m.dim() != (rows, labels) {
                return Err(MlError::malformed(format!(
                    "{name} is {:?}, expected ({rows}, {labels})",
                    m.dim()
                )));
            }
            for (i, row) in m.outer_iter().enumerate() {
                if row.iter().any(|p| !p.is_finite() || *p < 0.0) {
                    return Err(MlError::malformed(format!(
                        "{name} row {i} has a negative or non-finite probability"
                    )));
                }
                let sum: f32 = row.sum();
                if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                    return Err(MlError::malformed(format!("{name} row {i} sums to {sum}")));
                }
            }
        }
        Ok(())
    }
}

impl TryFrom<InferResponse> for InferenceOutput {
    type Error = MlError;

    fn try_from(resp: InferResponse) -> MlResult<Self> {
        Ok(Self {
            combined: to_matrix("prob", resp.prob)?,
            appearance: to_matrix("frames_prob", resp.frames_prob)?,
            motion: to_matrix("flow_prob", resp.flow_prob)?,
        })
    }
}

fn to_matrix(name: &str, rows: Vec<Vec<f32>>) -> MlResult<Array2<f32>> {
    let n = rows.len();
    let labels = rows.first().map(Vec::len).unwrap_or(0);
    if let Some(i) = rows.iter().position(|r| r.len() != labels) {
        return Err(MlError::malformed(format!(
            "{name} row {i} has {} labels, row 0 has {labels}",
            rows[i].len()
        )));
    }
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n, labels), flat)
        .map_err(|e| MlError::malformed(format!("{name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn uniform(rows: usize, labels: usize) -> Array2<f32> {
        Array2::from_elem((rows, labels), 1.0 / labels as f32)
    }

    #[test]
    fn test_batch_shape_checks() {
        let ok = Batch::new(
            vec![0, 4],
            Array4::zeros((2, 3, 8, 8)),
            Array4::zeros((2, 20, 8, 8)),
        )
        .unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok.window(), 10);

        let rows = Batch::new(vec![0], Array4::zeros((2, 3, 8, 8)), Array4::zeros((2, 20, 8, 8)));
        assert!(matches!(rows, Err(MlError::ShapeMismatch(_))));

        let spatial = Batch::new(
            vec![0, 1],
            Array4::zeros((2, 3, 8, 8)),
            Array4::zeros((2, 20, 4, 4)),
        );
        assert!(matches!(spatial, Err(MlError::ShapeMismatch(_))));

        let odd = Batch::new(
            vec![0, 1],
            Array4::zeros((2, 3, 8, 8)),
            Array4::zeros((2, 3, 8, 8)),
        );
        assert!(odd.is_err());
    }

    #[test]
    fn test_payload_is_row_major() {
        let mut a = Array4::<f32>::zeros((1, 3, 1, 2));
        a[[0, 1, 0, 1]] = 5.0;
        let payload = TensorPayload::from_array(&a);
        assert_eq!(payload.shape, vec![1, 3, 1, 2]);
        assert_eq!(payload.data[3], 5.0);
    }

    #[test]
    fn test_request_json_layout() {
        let batch = Batch::new(
            vec![0, 1],
            Array4::zeros((2, 3, 1, 1)),
            Array4::zeros((2, 2, 1, 1)),
        )
        .unwrap();
        let json = serde_json::to_value(InferRequest::from(&batch)).unwrap();
        assert_eq!(json["appearance"]["shape"], serde_json::json!([2, 3, 1, 1]));
        assert_eq!(json["motion"]["data"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_validate_accepts_probabilities() {
        let out = InferenceOutput {
            combined: uniform(2, 4),
            appearance: array![[0.7, 0.1, 0.1, 0.1], [0.0, 0.0, 0.0, 1.0]],
            motion: uniform(2, 4),
        };
        out.validate(2, 4).unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_output() {
        let wrong_rows = InferenceOutput {
            combined: uniform(3, 4),
            appearance: uniform(3, 4),
            motion: uniform(3, 4),
        };
        assert!(matches!(wrong_rows.validate(2, 4), Err(MlError::MalformedOutput(_))));

        let bad_sum = InferenceOutput {
            combined: uniform(1, 2),
            appearance: array![[0.9, 0.9]],
            motion: uniform(1, 2),
        };
        assert!(bad_sum.validate(1, 2).is_err());

        let negative = InferenceOutput {
            combined: uniform(1, 2),
            appearance: uniform(1, 2),
            motion: array![[1.5, -0.5]],
        };
        assert!(negative.validate(1, 2).is_err());
    }

    #[test]
    fn test_response_conversion() {
        let resp = InferResponse {
            prob: vec![vec![0.5, 0.5]],
            frames_prob: vec![vec![1.0, 0.0]],
            flow_prob: vec![vec![0.0, 1.0]],
        };
        let out = InferenceOutput::try_from(resp).unwrap();
        assert_eq!(out.appearance, array![[1.0, 0.0]]);

        let ragged = InferResponse {
            prob: vec![vec![0.5, 0.5], vec![1.0]],
            frames_prob: vec![],
            flow_prob: vec![],
        };
        assert!(InferenceOutput::try_from(ragged).is_err());
    }
}
