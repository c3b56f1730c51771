//! OpenCV Farneback backend.

use ndarray::Array2;
use opencv::core::{Mat, Vec2f};
use opencv::prelude::*;
use opencv::video::calc_optical_flow_farneback;

use super::{FarnebackParams, FlowEstimator, FlowField};
use crate::error::{MediaError, MediaResult};

/// Farneback flow computed by OpenCV's `calcOpticalFlowFarneback`.
#[derive(Debug, Clone, Default)]
pub struct OpenCvFarneback {
    params: FarnebackParams,
}

impl OpenCvFarneback {
    pub fn new(params: FarnebackParams) -> Self {
        Self { params }
    }
}

fn to_mat(img: &Array2<f32>) -> MediaResult<Mat> {
    let rows: Vec<Vec<u8>> = img
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|v| v.round().clamp(0.0, 255.0) as u8).collect())
        .collect();
    Mat::from_slice_2d(&rows).map_err(cv_error)
}

fn cv_error(e: opencv::Error) -> MediaError {
    MediaError::internal(format!("OpenCV: {e}"))
}

impl FlowEstimator for OpenCvFarneback {
    fn name(&self) -> &'static str {
        "opencv-farneback"
    }

    fn estimate(&self, prev: &Array2<f32>, next: &Array2<f32>) -> MediaResult<FlowField> {
        if prev.dim() != next.dim() {
            return Err(MediaError::internal(format!(
                "frame shapes differ: {:?} vs {:?}",
                prev.dim(),
                next.dim()
            )));
        }

        let prev_mat = to_mat(prev)?;
        let next_mat = to_mat(next)?;
        let mut flow = Mat::default();

        let p = &self.params;
        calc_optical_flow_farneback(
            &prev_mat,
            &next_mat,
            &mut flow,
            p.pyr_scale,
            p.levels as i32,
            p.win_size as i32,
            p.iterations as i32,
            p.poly_n as i32,
            p.poly_sigma,
            0,
        )
        .map_err(cv_error)?;

        let (h, w) = prev.dim();
        let mut field = FlowField::zeros((h, w));
        for y in 0..h {
            for x in 0..w {
                let v = flow.at_2d::<Vec2f>(y as i32, x as i32).map_err(cv_error)?;
                field.dx[[y, x]] = v[0];
                field.dy[[y, x]] = v[1];
            }
        }
        Ok(field)
    }
}
