//! Flow stack assembly.
//!
//! The stack for frame `start` holds transitions `start..start + K` as
//! channels `dx0, dy0, dx1, dy1, ...`. Transitions past the end of the
//! sequence are filled with the neutral (zero motion) pixel so every stack has
//! exactly `2K` channels.

use aline_media::{LoadedFlows, NEUTRAL_FLOW_PIXEL};
use ndarray::{s, Array2, Array3, ArrayViewMut2};

/// Value subtracted from motion pixels after rescaling.
pub const MOTION_MEAN: f32 = 127.0;

/// Normalize a quantized flow pixel for the motion stream.
///
/// Pixels are read as `[0, 1]`, scaled back by 255, and centered on 127.
#[inline]
pub fn normalize_motion(pixel: u8) -> f32 {
    (pixel as f32 / 255.0) * 255.0 - MOTION_MEAN
}

/// Build the `[2K, H, W]` motion stack for frame `start`.
pub fn build_stack(flows: &LoadedFlows, start: usize, window: usize) -> Array3<f32> {
    let (h, w) = flows.shape();
    let mut stack = Array3::<f32>::zeros((2 * window, h, w));
    let placeholder = normalize_motion(NEUTRAL_FLOW_PIXEL);

    for offset in 0..window {
        let transition = start + offset;
        let (dx_channel, dy_channel) = (2 * offset, 2 * offset + 1);

        match flows.get(transition) {
            Some((dx, dy)) => {
                fill(stack.slice_mut(s![dx_channel, .., ..]), dx);
                fill(stack.slice_mut(s![dy_channel, .., ..]), dy);
            }
            None => {
                stack.slice_mut(s![dx_channel, .., ..]).fill(placeholder);
                stack.slice_mut(s![dy_channel, .., ..]).fill(placeholder);
            }
        }
    }

    stack
}

fn fill(mut channel: ArrayViewMut2<'_, f32>, pixels: &Array2<u8>) {
    channel.zip_mut_with(pixels, |out, &p| *out = normalize_motion(p));
}
