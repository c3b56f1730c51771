//! Dense optical flow between consecutive frames.
//!
//! Raw displacement fields are quantized to 8-bit images so they can be
//! written as JPEGs and read back as a fixed-range motion signal:
//! `pixel = clip(round(raw * 2 + 128), 0, 255)`.

mod builder;
mod farneback;
#[cfg(feature = "opencv")]
mod opencv_backend;

use ndarray::Array2;

use crate::error::MediaResult;

pub use builder::{compute_flows, FlowFieldSet, FlowPair, LoadedFlows};
pub use farneback::Farneback;
#[cfg(feature = "opencv")]
pub use opencv_backend::OpenCvFarneback;

/// Quantized value of zero displacement.
pub const NEUTRAL_FLOW_PIXEL: u8 = 128;

/// Pixels per unit of displacement after quantization.
const QUANT_SCALE: f32 = 2.0;

/// Quantize a raw displacement to an 8-bit pixel.
#[inline]
pub fn quantize(raw: f32) -> u8 {
    if raw.is_nan() {
        return NEUTRAL_FLOW_PIXEL;
    }
    (raw * QUANT_SCALE + NEUTRAL_FLOW_PIXEL as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Raw displacement represented by a quantized pixel.
#[inline]
pub fn dequantize(pixel: u8) -> f32 {
    (pixel as f32 - NEUTRAL_FLOW_PIXEL as f32) / QUANT_SCALE
}

/// Continuous horizontal and vertical displacement, indexed `[y, x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    pub dx: Array2<f32>,
    pub dy: Array2<f32>,
}

impl FlowField {
    /// Zero motion of the given `(height, width)`.
    pub fn zeros(shape: (usize, usize)) -> Self {
        Self {
            dx: Array2::zeros(shape),
            dy: Array2::zeros(shape),
        }
    }

    /// `(height, width)` of the field.
    pub fn dim(&self) -> (usize, usize) {
        self.dx.dim()
    }

    /// Quantize both components.
    pub fn quantized(&self) -> (Array2<u8>, Array2<u8>) {
        (self.dx.mapv(quantize), self.dy.mapv(quantize))
    }
}

/// Algorithm parameters shared by every Farneback backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FarnebackParams {
    /// Scale between pyramid levels
    pub pyr_scale: f64,
    /// Number of pyramid levels, including the full-resolution one
    pub levels: usize,
    /// Averaging window size
    pub win_size: usize,
    /// Iterations per pyramid level
    pub iterations: usize,
    /// Neighborhood radius of the polynomial expansion
    pub poly_n: usize,
    /// Gaussian sigma of the polynomial expansion
    pub poly_sigma: f64,
}

impl Default for FarnebackParams {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            win_size: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

/// Estimates dense flow from `prev` to `next`.
///
/// Both inputs are grayscale intensities in `[0, 255]` with equal shape.
pub trait FlowEstimator: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    fn estimate(&self, prev: &Array2<f32>, next: &Array2<f32>) -> MediaResult<FlowField>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_examples() {
        assert_eq!(quantize(0.0), 128);
        assert_eq!(quantize(1.0), 130);
        assert_eq!(quantize(-1.0), 126);
        assert_eq!(quantize(0.25), 129);
        assert_eq!(quantize(100.0), 255);
        assert_eq!(quantize(-100.0), 0);
        assert_eq!(quantize(f32::NAN), 128);
    }

    #[test]
    fn test_dequantize_inverts_quantize() {
        for p in 0..=255u8 {
            assert_eq!(quantize(dequantize(p)), p);
        }
        assert_eq!(dequantize(NEUTRAL_FLOW_PIXEL), 0.0);
    }

    #[test]
    fn test_quantized_field() {
        let mut field = FlowField::zeros((2, 3));
        field.dx[[0, 0]] = 3.0;
        field.dy[[1, 2]] = -2.0;

        let (qx, qy) = field.quantized();
        assert_eq!(qx[[0, 0]], 134);
        assert_eq!(qx[[1, 1]], 128);
        assert_eq!(qy[[1, 2]], 124);
    }

    #[test]
    fn test_default_params() {
        let p = FarnebackParams::default();
        assert_eq!(p.levels, 3);
        assert_eq!(p.win_size, 15);
        assert_eq!(p.poly_n, 5);
        assert!((p.poly_sigma - 1.2).abs() < f64::EPSILON);
    }
}
