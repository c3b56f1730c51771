//! Image loading and writing helpers shared by the frame and flow stages.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, RgbImage};
use ndarray::Array2;

use crate::error::{MediaError, MediaResult};

/// JPEG quality used for flow images.
pub const FLOW_JPEG_QUALITY: u8 = 95;

/// Load an image as RGB8.
pub fn load_rgb(path: &Path) -> MediaResult<RgbImage> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| MediaError::image(path, e))
}

/// Load an image as a single 8-bit channel.
pub fn load_luma(path: &Path) -> MediaResult<GrayImage> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    image::open(path)
        .map(|img| img.to_luma8())
        .map_err(|e| MediaError::image(path, e))
}

/// Load a frame as grayscale intensities in `[0, 255]`.
pub fn load_gray(path: &Path) -> MediaResult<Array2<f32>> {
    load_rgb(path).map(|rgb| rgb_to_gray(&rgb))
}

/// Convert RGB to grayscale with BT.601 weights.
pub fn rgb_to_gray(rgb: &RgbImage) -> Array2<f32> {
    let (w, h) = rgb.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        let p = rgb.get_pixel(x as u32, y as u32);
        0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
    })
}

/// Write a single-channel image as JPEG.
pub fn write_gray_jpeg(path: &Path, img: &GrayImage, quality: u8) -> MediaResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(img)
        .map_err(|e| MediaError::image(path, e))?;
    writer.flush()?;
    Ok(())
}

/// Convert a `u8` grid into an image buffer.
pub fn array_to_gray(data: &Array2<u8>) -> GrayImage {
    let (h, w) = data.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        image::Luma([data[[y as usize, x as usize]]])
    })
}

/// Convert an image buffer into a `u8` grid.
pub fn gray_to_array(img: &GrayImage) -> Array2<u8> {
    let (w, h) = img.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[0]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    #[test]
    fn test_gray_weights() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([255, 255, 255]));

        let gray = rgb_to_gray(&rgb);
        assert_eq!(gray.dim(), (1, 2));
        assert!((gray[[0, 0]] - 76.245).abs() < 1e-3);
        assert!((gray[[0, 1]] - 255.0).abs() < 1e-3);
    }

    #[test]
    fn test_array_image_conversion() {
        let data = Array2::from_shape_fn((3, 4), |(y, x)| (y * 4 + x) as u8);
        let img = array_to_gray(&data);
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(gray_to_array(&img), data);
    }

    #[test]
    fn test_jpeg_roundtrip_flat_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("X000.jpg");
        let img = GrayImage::from_pixel(16, 16, image::Luma([128]));

        write_gray_jpeg(&path, &img, FLOW_JPEG_QUALITY).unwrap();
        let back = load_luma(&path).unwrap();

        assert_eq!(back.dimensions(), (16, 16));
        assert!(back.pixels().all(|p| (p[0] as i32 - 128).abs() <= 1));
    }

    #[test]
    fn test_missing_file() {
        let err = load_luma(Path::new("/nonexistent/frame.jpg")).unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
