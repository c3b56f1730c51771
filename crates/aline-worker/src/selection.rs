//! Deterministic frame index selection.

use thiserror::Error;

/// Inputs outside `n >= 2, max_len >= n`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("at least 2 indices are required, got {requested}")]
    TooFewIndices { requested: usize },

    #[error("cannot select {requested} indices from {available} frames")]
    NotEnoughFrames { requested: usize, available: usize },
}

/// Pick `n` strictly increasing indices in `[0, max_len)` with a fixed stride.
///
/// The stride is `(max_len - 1) / (n - 1)` and index `i` is `i * stride`, so
/// the first index is always 0 and exactly `n` indices come back.
pub fn select(max_len: usize, n: usize) -> Result<Vec<usize>, SelectionError> {
    if n < 2 {
        return Err(SelectionError::TooFewIndices { requested: n });
    }
    if max_len < n {
        return Err(SelectionError::NotEnoughFrames {
            requested: n,
            available: max_len,
        });
    }

    let stride = (max_len - 1) / (n - 1);
    Ok((0..n).map(|i| i * stride).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_case() {
        assert_eq!(select(10, 5).unwrap(), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_exact_fit_spans_both_ends() {
        assert_eq!(select(5, 5).unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(select(9, 5).unwrap(), vec![0, 2, 4, 6, 8]);
        assert_eq!(select(2, 2).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_always_exactly_n_increasing_in_range() {
        for n in 2..=40 {
            for max_len in n..=300 {
                let indices = select(max_len, n).unwrap();
                assert_eq!(indices.len(), n, "select({max_len}, {n})");
                assert_eq!(indices[0], 0);
                assert!(indices.windows(2).all(|w| w[0] < w[1]));
                assert!(*indices.last().unwrap() < max_len);
            }
        }
    }

    #[test]
    fn test_video_default_batch() {
        // 3 seconds at 15 fps
        let indices = select(45, 16).unwrap();
        assert_eq!(indices.len(), 16);
        assert_eq!(indices[1], 2);
        assert_eq!(indices[15], 30);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert_eq!(
            select(10, 1),
            Err(SelectionError::TooFewIndices { requested: 1 })
        );
        assert_eq!(
            select(3, 5),
            Err(SelectionError::NotEnoughFrames {
                requested: 5,
                available: 3
            })
        );
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(select(123, 16).unwrap(), select(123, 16).unwrap());
    }
}
