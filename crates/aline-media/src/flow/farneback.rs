//! Pure-Rust Farneback dense optical flow.
//!
//! Each frame is locally approximated by a quadratic polynomial
//! `f(x) ~ x^T A x + b^T x + c` (Gaussian-weighted least squares), and the
//! displacement is solved from how the polynomial coefficients change between
//! frames. A coarse-to-fine pyramid handles displacements larger than the
//! polynomial neighborhood.

use ndarray::Array2;

use super::{FarnebackParams, FlowEstimator, FlowField};
use crate::error::{MediaError, MediaResult};

/// Pyramid levels smaller than this (in either dimension) are skipped.
const MIN_LEVEL_SIZE: usize = 32;

/// Regularizer added to the 2x2 determinant in the displacement solve.
const DET_EPSILON: f32 = 1e-3;

/// Polynomial expansion coefficients of one image.
struct PolyExpansion {
    a11: Array2<f32>,
    a12: Array2<f32>,
    a22: Array2<f32>,
    b1: Array2<f32>,
    b2: Array2<f32>,
}

/// Farneback estimator with precomputed polynomial expansion kernels.
#[derive(Debug, Clone)]
pub struct Farneback {
    params: FarnebackParams,
    /// Gaussian weights `g(i)` for `i in -n..=n`
    g: Vec<f32>,
    /// `i * g(i)`
    xg: Vec<f32>,
    /// `i^2 * g(i)`
    xxg: Vec<f32>,
    /// Inverse Gram matrix of the basis `1, x, y, x^2, y^2, xy`
    gram_inv: [[f32; 6]; 6],
}

impl Farneback {
    /// Build an estimator, rejecting parameters the algorithm cannot run with.
    pub fn new(params: FarnebackParams) -> MediaResult<Self> {
        if params.levels == 0 || params.iterations == 0 || params.win_size == 0 {
            return Err(MediaError::internal(
                "Farneback levels, iterations and window must be positive",
            ));
        }
        if params.poly_n == 0 || params.poly_sigma <= 0.0 {
            return Err(MediaError::internal(
                "Farneback polynomial neighborhood and sigma must be positive",
            ));
        }
        if !(params.pyr_scale > 0.0 && params.pyr_scale < 1.0) {
            return Err(MediaError::internal("Farneback pyramid scale must be in (0, 1)"));
        }

        let n = params.poly_n as i32;
        let sigma = params.poly_sigma;
        let raw: Vec<f64> = (-n..=n)
            .map(|i| (-(i * i) as f64 / (2.0 * sigma * sigma)).exp())
            .collect();
        let total: f64 = raw.iter().sum();
        let g64: Vec<f64> = raw.iter().map(|v| v / total).collect();

        let mut gram = [[0.0f64; 6]; 6];
        for (iy, gy) in g64.iter().enumerate() {
            for (ix, gx) in g64.iter().enumerate() {
                let x = ix as f64 - n as f64;
                let y = iy as f64 - n as f64;
                let basis = [1.0, x, y, x * x, y * y, x * y];
                let w = gx * gy;
                for i in 0..6 {
                    for j in 0..6 {
                        gram[i][j] += w * basis[i] * basis[j];
                    }
                }
            }
        }

        let inv = invert6(gram).ok_or_else(|| {
            MediaError::internal("Polynomial expansion Gram matrix is singular")
        })?;
        let mut gram_inv = [[0.0f32; 6]; 6];
        for i in 0..6 {
            for j in 0..6 {
                gram_inv[i][j] = inv[i][j] as f32;
            }
        }

        let g: Vec<f32> = g64.iter().map(|&v| v as f32).collect();
        let xg = g
            .iter()
            .enumerate()
            .map(|(i, v)| v * (i as f32 - n as f32))
            .collect();
        let xxg = g
            .iter()
            .enumerate()
            .map(|(i, v)| v * (i as f32 - n as f32).powi(2))
            .collect();

        Ok(Self {
            params,
            g,
            xg,
            xxg,
            gram_inv,
        })
    }

    pub fn params(&self) -> &FarnebackParams {
        &self.params
    }

    /// Number of pyramid levels usable for an image of this size.
    fn level_count(&self, height: usize, width: usize) -> usize {
        let smallest = height.min(width) as f64;
        let mut levels = 1;
        for level in 1..self.params.levels {
            if smallest * self.params.pyr_scale.powi(level as i32) < MIN_LEVEL_SIZE as f64 {
                break;
            }
            levels += 1;
        }
        levels
    }

    fn expand(&self, img: &Array2<f32>) -> PolyExpansion {
        let r0 = correlate_rows(img, &self.g);
        let r1 = correlate_rows(img, &self.xg);
        let r2 = correlate_rows(img, &self.xxg);

        let moments = [
            correlate_cols(&r0, &self.g),
            correlate_cols(&r1, &self.g),
            correlate_cols(&r0, &self.xg),
            correlate_cols(&r2, &self.g),
            correlate_cols(&r0, &self.xxg),
            correlate_cols(&r1, &self.xg),
        ];

        let coeff = |row: usize| {
            let inv = self.gram_inv[row];
            let mut out = Array2::<f32>::zeros(img.dim());
            for (k, m) in moments.iter().enumerate() {
                if inv[k] != 0.0 {
                    out.scaled_add(inv[k], m);
                }
            }
            out
        };

        PolyExpansion {
            b1: coeff(1),
            b2: coeff(2),
            a11: coeff(3),
            a22: coeff(4),
            a12: coeff(5).mapv(|v| v * 0.5),
        }
    }

    /// One refinement step: re-solve the displacement given the current one.
    fn update(&self, e1: &PolyExpansion, e2: &PolyExpansion, flow: &FlowField) -> FlowField {
        let (h, w) = flow.dim();
        let mut m: [Array2<f32>; 5] = std::array::from_fn(|_| Array2::zeros((h, w)));

        for y in 0..h {
            for x in 0..w {
                let dx = flow.dx[[y, x]];
                let dy = flow.dy[[y, x]];
                let sy = y as f32 + dy;
                let sx = x as f32 + dx;

                let a11 = (e1.a11[[y, x]] + bilinear(&e2.a11, sy, sx)) * 0.5;
                let a12 = (e1.a12[[y, x]] + bilinear(&e2.a12, sy, sx)) * 0.5;
                let a22 = (e1.a22[[y, x]] + bilinear(&e2.a22, sy, sx)) * 0.5;

                let db1 = -0.5 * (bilinear(&e2.b1, sy, sx) - e1.b1[[y, x]]) + a11 * dx + a12 * dy;
                let db2 = -0.5 * (bilinear(&e2.b2, sy, sx) - e1.b2[[y, x]]) + a12 * dx + a22 * dy;

                m[0][[y, x]] = a11 * a11 + a12 * a12;
                m[1][[y, x]] = a12 * (a11 + a22);
                m[2][[y, x]] = a12 * a12 + a22 * a22;
                m[3][[y, x]] = a11 * db1 + a12 * db2;
                m[4][[y, x]] = a12 * db1 + a22 * db2;
            }
        }

        let window = vec![1.0 / self.params.win_size as f32; self.params.win_size];
        let m = m.map(|c| correlate_cols(&correlate_rows(&c, &window), &window));

        let mut out = FlowField::zeros((h, w));
        for y in 0..h {
            for x in 0..w {
                let g11 = m[0][[y, x]];
                let g12 = m[1][[y, x]];
                let g22 = m[2][[y, x]];
                let h1 = m[3][[y, x]];
                let h2 = m[4][[y, x]];

                let idet = 1.0 / (g11 * g22 - g12 * g12 + DET_EPSILON);
                out.dx[[y, x]] = (g22 * h1 - g12 * h2) * idet;
                out.dy[[y, x]] = (g11 * h2 - g12 * h1) * idet;
            }
        }
        out
    }
}

impl FlowEstimator for Farneback {
    fn name(&self) -> &'static str {
        "farneback"
    }

    fn estimate(&self, prev: &Array2<f32>, next: &Array2<f32>) -> MediaResult<FlowField> {
        if prev.dim() != next.dim() {
            return Err(MediaError::internal(format!(
                "frame shapes differ: {:?} vs {:?}",
                prev.dim(),
                next.dim()
            )));
        }
        let (h, w) = prev.dim();
        if h == 0 || w == 0 {
            return Err(MediaError::internal("cannot estimate flow on an empty frame"));
        }

        let mut flow: Option<FlowField> = None;

        for level in (0..self.level_count(h, w)).rev() {
            let (e1, e2) = if level == 0 {
                (self.expand(prev), self.expand(next))
            } else {
                let scale = self.params.pyr_scale.powi(level as i32);
                let size = (
                    ((h as f64 * scale).round() as usize).max(1),
                    ((w as f64 * scale).round() as usize).max(1),
                );
                let sigma = ((1.0 / scale - 1.0) * 0.5) as f32;
                (
                    self.expand(&resize_bilinear(&gaussian_blur(prev, sigma), size)),
                    self.expand(&resize_bilinear(&gaussian_blur(next, sigma), size)),
                )
            };

            let size = e1.b1.dim();
            let mut field = match flow.take() {
                None => FlowField::zeros(size),
                Some(coarse) => {
                    let up = (1.0 / self.params.pyr_scale) as f32;
                    FlowField {
                        dx: resize_bilinear(&coarse.dx, size) * up,
                        dy: resize_bilinear(&coarse.dy, size) * up,
                    }
                }
            };

            for _ in 0..self.params.iterations {
                field = self.update(&e1, &e2, &field);
            }
            flow = Some(field);
        }

        flow.ok_or_else(|| MediaError::internal("no pyramid level processed"))
    }
}

#[inline]
fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

/// Horizontal correlation with replicated borders.
fn correlate_rows(src: &Array2<f32>, kernel: &[f32]) -> Array2<f32> {
    let (h, w) = src.dim();
    let r = (kernel.len() / 2) as isize;
    Array2::from_shape_fn((h, w), |(y, x)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, kv)| kv * src[[y, clamp_index(x as isize + k as isize - r, w)]])
            .sum()
    })
}

/// Vertical correlation with replicated borders.
fn correlate_cols(src: &Array2<f32>, kernel: &[f32]) -> Array2<f32> {
    let (h, w) = src.dim();
    let r = (kernel.len() / 2) as isize;
    Array2::from_shape_fn((h, w), |(y, x)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, kv)| kv * src[[clamp_index(y as isize + k as isize - r, h), x]])
            .sum()
    })
}

fn gaussian_blur(src: &Array2<f32>, sigma: f32) -> Array2<f32> {
    if sigma <= 0.0 {
        return src.clone();
    }
    let radius = ((sigma * 3.0).ceil() as i32).max(1);
    let raw: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = raw.iter().sum();
    let kernel: Vec<f32> = raw.iter().map(|v| v / total).collect();
    correlate_cols(&correlate_rows(src, &kernel), &kernel)
}

/// Bilinear sample at fractional `(y, x)`, clamping to the image.
fn bilinear(src: &Array2<f32>, y: f32, x: f32) -> f32 {
    let (h, w) = src.dim();
    let y = y.clamp(0.0, (h - 1) as f32);
    let x = x.clamp(0.0, (w - 1) as f32);
    let y0 = y.floor() as usize;
    let x0 = x.floor() as usize;
    let y1 = (y0 + 1).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let fy = y - y0 as f32;
    let fx = x - x0 as f32;

    let top = src[[y0, x0]] * (1.0 - fx) + src[[y0, x1]] * fx;
    let bottom = src[[y1, x0]] * (1.0 - fx) + src[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}

fn resize_bilinear(src: &Array2<f32>, size: (usize, usize)) -> Array2<f32> {
    let (h, w) = src.dim();
    if (h, w) == size {
        return src.clone();
    }
    let sy = h as f32 / size.0 as f32;
    let sx = w as f32 / size.1 as f32;
    Array2::from_shape_fn(size, |(y, x)| {
        bilinear(
            src,
            (y as f32 + 0.5) * sy - 0.5,
            (x as f32 + 0.5) * sx - 0.5,
        )
    })
}

/// Gauss-Jordan inversion with partial pivoting.
fn invert6(mut m: [[f64; 6]; 6]) -> Option<[[f64; 6]; 6]> {
    let mut inv = [[0.0f64; 6]; 6];
    for (i, row) in inv.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for col in 0..6 {
        let pivot = (col..6).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        inv.swap(col, pivot);

        let p = m[col][col];
        for j in 0..6 {
            m[col][j] /= p;
            inv[col][j] /= p;
        }

        for row in 0..6 {
            if row == col {
                continue;
            }
            let factor = m[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..6 {
                m[row][j] -= factor * m[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }

    Some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(h: usize, w: usize, shift_x: f32, shift_y: f32) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(y, x)| {
            let x = x as f32 - shift_x;
            let y = y as f32 - shift_y;
            128.0 + 50.0 * (0.3 * x).sin() * (0.25 * y).cos() + 30.0 * (0.2 * x + 0.15 * y).cos()
        })
    }

    fn central_mean(a: &Array2<f32>) -> f32 {
        let (h, w) = a.dim();
        let view = a.slice(ndarray::s![h / 3..2 * h / 3, w / 3..2 * w / 3]);
        view.sum() / view.len() as f32
    }

    #[test]
    fn test_identical_frames_have_zero_flow() {
        let fb = Farneback::new(FarnebackParams::default()).unwrap();
        let img = pattern(48, 48, 0.0, 0.0);
        let flow = fb.estimate(&img, &img).unwrap();

        assert_eq!(flow.dim(), (48, 48));
        assert!(flow.dx.iter().all(|v| v.abs() < 1e-4));
        assert!(flow.dy.iter().all(|v| v.abs() < 1e-4));
    }

    #[test]
    fn test_horizontal_shift_is_recovered() {
        let fb = Farneback::new(FarnebackParams::default()).unwrap();
        let prev = pattern(64, 64, 0.0, 0.0);
        let next = pattern(64, 64, 2.0, 0.0);

        let flow = fb.estimate(&prev, &next).unwrap();
        let dx = central_mean(&flow.dx);
        let dy = central_mean(&flow.dy);
        assert!((dx - 2.0).abs() < 0.5, "dx = {dx}");
        assert!(dy.abs() < 0.4, "dy = {dy}");
    }

    #[test]
    fn test_vertical_shift_is_recovered() {
        let fb = Farneback::new(FarnebackParams::default()).unwrap();
        let prev = pattern(64, 64, 0.0, 0.0);
        let next = pattern(64, 64, 0.0, -1.5);

        let flow = fb.estimate(&prev, &next).unwrap();
        let dy = central_mean(&flow.dy);
        assert!((dy + 1.5).abs() < 0.5, "dy = {dy}");
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        let fb = Farneback::new(FarnebackParams::default()).unwrap();
        let err = fb
            .estimate(&Array2::zeros((8, 8)), &Array2::zeros((8, 9)))
            .unwrap_err();
        assert!(matches!(err, MediaError::Internal(_)));
    }

    #[test]
    fn test_invalid_params() {
        let params = FarnebackParams {
            pyr_scale: 1.5,
            ..FarnebackParams::default()
        };
        assert!(Farneback::new(params).is_err());

        let params = FarnebackParams {
            poly_n: 0,
            ..FarnebackParams::default()
        };
        assert!(Farneback::new(params).is_err());
    }

    #[test]
    fn test_level_count_respects_min_size() {
        let fb = Farneback::new(FarnebackParams::default()).unwrap();
        assert_eq!(fb.level_count(224, 224), 3);
        assert_eq!(fb.level_count(64, 64), 2);
        assert_eq!(fb.level_count(20, 20), 1);
    }

    #[test]
    fn test_invert_identity() {
        let mut id = [[0.0f64; 6]; 6];
        for (i, row) in id.iter_mut().enumerate() {
            row[i] = 2.0;
        }
        let inv = invert6(id).unwrap();
        assert!((inv[3][3] - 0.5).abs() < 1e-12);
        assert!(invert6([[0.0; 6]; 6]).is_none());
    }

    #[test]
    fn test_resize_constant() {
        let src = Array2::from_elem((10, 10), 7.0f32);
        let out = resize_bilinear(&src, (5, 4));
        assert_eq!(out.dim(), (5, 4));
        assert!(out.iter().all(|v| (v - 7.0).abs() < 1e-5));
    }
}
