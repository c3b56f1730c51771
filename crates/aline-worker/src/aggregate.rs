//! Top-K aggregation into the response payload.

use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView1};

use aline_models::{FramePrediction, LabelMapping, LabelPrediction, MediaRef, PredictionResult};

use crate::error::{WorkerError, WorkerResult};

/// Label ids of the `k` largest entries of `row`.
///
/// Ordered by probability descending, ties by label id ascending. A row with
/// fewer than `k` labels returns all of them.
pub fn top_k(row: ArrayView1<'_, f32>, k: usize) -> Vec<usize> {
    let mut ids: Vec<usize> = (0..row.len()).collect();
    let k = k.min(ids.len());
    let by_rank = |a: &usize, b: &usize| row[*b].total_cmp(&row[*a]).then(a.cmp(b));

    if k < ids.len() && k > 0 {
        ids.select_nth_unstable_by(k - 1, by_rank);
    }
    ids.truncate(k);
    ids.sort_by(by_rank);
    ids
}

/// Build the payload for `media_url` from a `[N, numLabels]` matrix.
pub fn aggregate(
    media_url: &str,
    probs: &Array2<f32>,
    labels: &LabelMapping,
    k: usize,
) -> WorkerResult<PredictionResult> {
    aggregate_at(media_url, probs, labels, k, Utc::now())
}

/// [`aggregate`] with an explicit cachebuster time.
pub fn aggregate_at(
    media_url: &str,
    probs: &Array2<f32>,
    labels: &LabelMapping,
    k: usize,
    now: DateTime<Utc>,
) -> WorkerResult<PredictionResult> {
    if probs.ncols() != labels.len() {
        return Err(WorkerError::internal(format!(
            "probability matrix has {} labels, mapping has {}",
            probs.ncols(),
            labels.len()
        )));
    }

    let frames = probs
        .outer_iter()
        .enumerate()
        .map(|(frame_number, row)| -> WorkerResult<FramePrediction> {
            let predictions = top_k(row, k)
                .into_iter()
                .map(|id| -> WorkerResult<LabelPrediction> {
                    let name = labels.get(id).ok_or_else(|| {
                        WorkerError::internal(format!("label id {id} missing from mapping"))
                    })?;
                    Ok(LabelPrediction::new(name, row[id]))
                })
                .collect::<WorkerResult<Vec<_>>>()?;
            Ok(FramePrediction {
                frame_number,
                predictions,
            })
        })
        .collect::<WorkerResult<Vec<_>>>()?;

    Ok(PredictionResult {
        media: MediaRef::with_cachebuster(media_url, now),
        frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::array;

    fn labels(n: usize) -> LabelMapping {
        LabelMapping::from_names((0..n).map(|i| format!("action{i}"))).unwrap()
    }

    #[test]
    fn test_top_k_order_and_ties() {
        let row = array![0.1f32, 0.3, 0.05, 0.3, 0.25];
        assert_eq!(top_k(row.view(), 3), vec![1, 3, 4]);
        assert_eq!(top_k(row.view(), 5), vec![1, 3, 4, 0, 2]);
        assert_eq!(top_k(row.view(), 9), vec![1, 3, 4, 0, 2]);
        assert!(top_k(row.view(), 0).is_empty());
    }

    #[test]
    fn test_aggregate_shape() {
        let probs = Array2::from_shape_fn((4, 8), |(r, c)| if c == r { 0.65 } else { 0.05 });
        let now = Utc.timestamp_opt(1_700_000_000, 42_000).unwrap();

        let result = aggregate_at("/videos/clip.webm", &probs, &labels(8), 5, now).unwrap();

        assert_eq!(result.media.url, "/videos/clip.webm?cachebuster=1700000000.000042");
        assert_eq!(result.len(), 4);
        let mapping = labels(8);
        for (i, frame) in result.frames.iter().enumerate() {
            assert_eq!(frame.frame_number, i);
            assert_eq!(frame.predictions.len(), 5);
            assert_eq!(frame.predictions[0].label, format!("action{i}"));
            assert!((frame.predictions[0].prob - 0.65).abs() < 1e-6);
            assert!(frame.predictions.iter().all(|p| mapping.contains_name(&p.label)));
        }
        // Ties after the winner resolve by id
        assert_eq!(result.frames[0].predictions[1].label, "action1");
    }

    #[test]
    fn test_label_count_mismatch() {
        let probs = Array2::from_elem((1, 3), 1.0 / 3.0);
        assert!(aggregate("/videos/a.webm", &probs, &labels(4), 5).is_err());
    }

    #[test]
    fn test_fewer_labels_than_k() {
        let probs = array![[0.2f32, 0.8]];
        let result = aggregate("/videos/a.png", &probs, &labels(2), 5).unwrap();
        assert_eq!(result.frames[0].predictions.len(), 2);
        assert_eq!(result.frames[0].predictions[0].label, "action1");
        assert!(result.media.cachebuster().is_some());
    }
}
