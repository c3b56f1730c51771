//! Appearance/motion batch building.

use std::path::Path;

use image::imageops::{self, FilterType};
use ndarray::{s, Array3, Array4};
use rayon::prelude::*;
use serde::Deserialize;

use aline_media::imaging::load_rgb;
use aline_media::{FrameSequence, LoadedFlows};
use aline_ml_client::Batch;
use aline_models::InputShape;

use crate::error::{WorkerError, WorkerResult};
use crate::stack::build_stack;

/// Per-channel mean subtracted from appearance frames, in BGR order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMean(pub [f32; 3]);

impl Default for ChannelMean {
    fn default() -> Self {
        Self([104.0, 117.0, 123.0])
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MeanFile {
    Vector([f32; 3]),
    Image(Vec<Vec<Vec<f32>>>),
}

impl ChannelMean {
    /// Parse a mean from JSON: either `[b, g, r]` or a `[3][H][W]` mean image,
    /// which is reduced to its per-channel average.
    pub fn from_json(text: &str) -> WorkerResult<Self> {
        let parsed: MeanFile = serde_json::from_str(text)
            .map_err(|e| WorkerError::config_error(format!("channel mean: {e}")))?;

        match parsed {
            MeanFile::Vector(v) => Ok(Self(v)),
            MeanFile::Image(planes) => {
                if planes.len() != 3 {
                    return Err(WorkerError::config_error(format!(
                        "channel mean image has {} channels, expected 3",
                        planes.len()
                    )));
                }
                let mut mean = [0.0f32; 3];
                for (c, plane) in planes.iter().enumerate() {
                    let count: usize = plane.iter().map(Vec::len).sum();
                    if count == 0 {
                        return Err(WorkerError::config_error(format!(
                            "channel mean plane {c} is empty"
                        )));
                    }
                    let total: f64 = plane.iter().flatten().map(|&v| v as f64).sum();
                    mean[c] = (total / count as f64) as f32;
                }
                Ok(Self(mean))
            }
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> WorkerResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            WorkerError::config_error(format!(
                "cannot read channel mean {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_json(&text)
    }
}

/// Turns a frame file into a `[3, H, W]` appearance tensor.
///
/// Pixels are scaled to `[0, 1]`, resized, scaled back by 255, reordered to
/// BGR, and mean-subtracted.
#[derive(Debug, Clone)]
pub struct AppearanceTransform {
    shape: InputShape,
    mean: ChannelMean,
}

impl AppearanceTransform {
    pub fn new(shape: InputShape, mean: ChannelMean) -> Self {
        Self { shape, mean }
    }

    pub fn shape(&self) -> InputShape {
        self.shape
    }

    pub fn mean(&self) -> ChannelMean {
        self.mean
    }

    pub fn apply(&self, path: &Path) -> WorkerResult<Array3<f32>> {
        let rgb = load_rgb(path)?;
        let (w, h) = (self.shape.width as u32, self.shape.height as u32);
        let rgb = if rgb.dimensions() == (w, h) {
            rgb
        } else {
            imageops::resize(&rgb, w, h, FilterType::Triangle)
        };

        let mean = self.mean.0;
        Ok(Array3::from_shape_fn(
            (3, self.shape.height, self.shape.width),
            |(c, y, x)| {
                // Channel c of the output is BGR; RGB source index is 2 - c
                let p = rgb.get_pixel(x as u32, y as u32)[2 - c] as f32 / 255.0;
                p * 255.0 - mean[c]
            },
        ))
    }
}

/// Build the appearance and motion tensors for `selection`.
///
/// Rows are computed in parallel and placed by position, so row `i` of both
/// tensors always describes `selection[i]`. Blocking; call from a rayon pool.
pub fn build_batch(
    selection: &[usize],
    frames: &FrameSequence,
    flows: &LoadedFlows,
    transform: &AppearanceTransform,
    window: usize,
) -> WorkerResult<Batch> {
    let shape = transform.shape();
    if flows.shape() != (shape.height, shape.width) {
        return Err(WorkerError::internal(format!(
            "flows are {:?}, input shape is {}x{}",
            flows.shape(),
            shape.height,
            shape.width
        )));
    }

    let rows = selection
        .par_iter()
        .map(|&index| -> WorkerResult<(Array3<f32>, Array3<f32>)> {
            let frame = frames.get(index).ok_or_else(|| {
                WorkerError::internal(format!(
                    "selected index {index} outside {} frames",
                    frames.len()
                ))
            })?;
            Ok((transform.apply(frame)?, build_stack(flows, index, window)))
        })
        .collect::<WorkerResult<Vec<_>>>()?;

    let n = selection.len();
    let mut appearance = Array4::<f32>::zeros((n, 3, shape.height, shape.width));
    let mut motion = Array4::<f32>::zeros((n, 2 * window, shape.height, shape.width));
    for (i, (app, mot)) in rows.into_iter().enumerate() {
        appearance.slice_mut(s![i, .., .., ..]).assign(&app);
        motion.slice_mut(s![i, .., .., ..]).assign(&mot);
    }

    Ok(Batch::new(selection.to_vec(), appearance, motion)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use ndarray::Array2;
    use tempfile::TempDir;

    fn write_frames(dir: &Path, count: usize) -> FrameSequence {
        for i in 0..count {
            let img = RgbImage::from_pixel(8, 8, Rgb([10 * i as u8, 100, 200]));
            img.save(dir.join(format!("{:03}.png", i + 1))).unwrap();
        }
        FrameSequence::from_dir(dir).unwrap()
    }

    #[test]
    fn test_mean_from_vector() {
        let mean = ChannelMean::from_json("[1.0, 2.0, 3.0]").unwrap();
        assert_eq!(mean, ChannelMean([1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_mean_from_image() {
        let json = "[[[1, 3], [1, 3]], [[4, 4], [4, 4]], [[0, 10], [0, 10]]]";
        let mean = ChannelMean::from_json(json).unwrap();
        assert_eq!(mean, ChannelMean([2.0, 4.0, 5.0]));
    }

    #[test]
    fn test_mean_rejects_wrong_channels() {
        assert!(ChannelMean::from_json("[[[1]], [[2]]]").is_err());
        assert!(ChannelMean::from_json("{\"mean\": 1}").is_err());
    }

    #[test]
    fn test_transform_swaps_and_subtracts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])).save(&path).unwrap();

        let transform = AppearanceTransform::new(InputShape::new(2, 3), ChannelMean([1.0, 2.0, 3.0]));
        let out = transform.apply(&path).unwrap();

        assert_eq!(out.dim(), (3, 2, 3));
        // B - 1, G - 2, R - 3
        assert!((out[[0, 1, 1]] - 29.0).abs() < 1e-3);
        assert!((out[[1, 1, 1]] - 18.0).abs() < 1e-3);
        assert!((out[[2, 1, 1]] - 7.0).abs() < 1e-3);
    }

    #[test]
    fn test_rows_follow_selection() {
        let dir = TempDir::new().unwrap();
        let frames = write_frames(dir.path(), 6);
        let transform = AppearanceTransform::new(InputShape::new(8, 8), ChannelMean([0.0; 3]));
        let flows = LoadedFlows::from_fields(
            (8, 8),
            (0..5)
                .map(|t| (Array2::from_elem((8, 8), 140 + t as u8), Array2::from_elem((8, 8), 128)))
                .collect(),
        )
        .unwrap();

        let pool = rayon::ThreadPoolBuilder::new().num_threads(3).build().unwrap();
        let batch = pool
            .install(|| build_batch(&[0, 2, 4], &frames, &flows, &transform, 2))
            .unwrap();

        assert_eq!(batch.indices(), &[0, 2, 4]);
        assert_eq!(batch.appearance().dim(), (3, 3, 8, 8));
        assert_eq!(batch.motion().dim(), (3, 4, 8, 8));

        // Red channel lands in BGR position 2 and encodes the frame index
        for (row, index) in [0usize, 2, 4].iter().enumerate() {
            let red = batch.appearance()[[row, 2, 0, 0]];
            assert!((red - 10.0 * *index as f32).abs() < 1e-3);
            let dx0 = batch.motion()[[row, 0, 0, 0]];
            assert!((dx0 - (140.0 + *index as f32 - 127.0)).abs() < 1e-3);
        }
        // Frame 4 only has transition 4; its second dx is a placeholder
        assert!((batch.motion()[[2, 2, 0, 0]] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_shape_mismatch() {
        let dir = TempDir::new().unwrap();
        let frames = write_frames(dir.path(), 2);
        let transform = AppearanceTransform::new(InputShape::new(8, 8), ChannelMean::default());
        let err = build_batch(&[0, 1], &frames, &LoadedFlows::empty((4, 4)), &transform, 2).unwrap_err();
        assert!(matches!(err, WorkerError::Internal(_)));
    }
}
