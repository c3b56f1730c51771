//! Frame extraction and frame directory handling.
//!
//! Frames are written by FFmpeg as `001.jpg, 002.jpg, ...` (1-indexed,
//! zero-padded) and always read back in natural filename order.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use metrics::counter;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Output pattern for extracted frames.
pub const FRAME_PATTERN: &str = "%03d.jpg";

/// JPEG quantizer for extracted frames.
const FRAME_QSCALE: u8 = 2;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Ordered, read-only sequence of still frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSequence {
    files: Vec<PathBuf>,
}

impl FrameSequence {
    /// Read a frame directory in natural filename order.
    pub fn from_dir(dir: impl AsRef<Path>) -> MediaResult<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }

        files.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
        Ok(Self { files })
    }

    /// A still image repeated `copies` times.
    ///
    /// Still-image requests have no motion; every copy stands for the same
    /// instant and flow stacks are all placeholders.
    pub fn from_still(image: impl AsRef<Path>, copies: usize) -> Self {
        Self {
            files: vec![image.as_ref().to_path_buf(); copies],
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Frame at 0-based position `index`.
    pub fn get(&self, index: usize) -> Option<&Path> {
        self.files.get(index).map(PathBuf::as_path)
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Sample `video` at `fps`, crop a `crop_size` square at the origin, and write
/// numbered JPEG frames into `out_dir`.
///
/// `out_dir` must exist. Existing frame files make FFmpeg fail rather than be
/// replaced.
pub async fn extract_frames(
    runner: &FfmpegRunner,
    video: impl AsRef<Path>,
    fps: u32,
    crop_size: u32,
    out_dir: impl AsRef<Path>,
) -> MediaResult<FrameSequence> {
    let video = video.as_ref();
    let out_dir = out_dir.as_ref();

    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }
    if !out_dir.is_dir() {
        return Err(MediaError::invalid_layout(out_dir, "output directory does not exist"));
    }

    let cmd = FfmpegCommand::new(video, out_dir.join(FRAME_PATTERN))
        .no_overwrite()
        .frame_rate(fps)
        .jpeg_quality(FRAME_QSCALE)
        .video_filter(format!("crop={0}:{0}:0:0", crop_size));

    let outcome = runner.run(&cmd).await?;
    debug!(
        reported_frames = outcome.progress.frame,
        "Frame extraction finished"
    );

    let frames = FrameSequence::from_dir(out_dir)?;
    if frames.is_empty() {
        return Err(MediaError::NoFrames(video.to_path_buf()));
    }

    counter!("aline_frames_extracted_total").increment(frames.len() as u64);
    info!(
        video = %video.display(),
        frames = frames.len(),
        fps,
        crop_size,
        "Extracted frames"
    );

    Ok(frames)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Compare names treating digit runs as numbers (`2.jpg < 10.jpg`).
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let na = take_number(&mut a);
                let nb = take_number(&mut b);
                let ord = na
                    .trim_start_matches('0')
                    .len()
                    .cmp(&nb.trim_start_matches('0').len())
                    .then_with(|| na.trim_start_matches('0').cmp(nb.trim_start_matches('0')))
                    .then_with(|| na.len().cmp(&nb.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                if ca != cb {
                    return ca.cmp(&cb);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_natural_order() {
        let mut names = vec!["10.jpg", "2.jpg", "001.jpg", "1000.jpg", "999.jpg"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["001.jpg", "2.jpg", "10.jpg", "999.jpg", "1000.jpg"]);
    }

    #[test]
    fn test_from_dir_sorts_and_filters() {
        let dir = TempDir::new().unwrap();
        for name in ["010.jpg", "002.jpg", "001.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let frames = FrameSequence::from_dir(dir.path()).unwrap();
        assert_eq!(frames.len(), 3);
        let names: Vec<String> = frames.files().iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["001.jpg", "002.jpg", "010.jpg"]);
    }

    #[test]
    fn test_from_still() {
        let frames = FrameSequence::from_still("/uploads/photo.png", 2);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames.get(0), frames.get(1));
        assert_eq!(frames.get(2), None);
    }

    #[tokio::test]
    async fn test_extract_missing_video() {
        let dir = TempDir::new().unwrap();
        let err = extract_frames(
            &FfmpegRunner::new(),
            dir.path().join("missing.mp4"),
            15,
            224,
            dir.path(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_tool_success_without_frames_is_error() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"not really a video").unwrap();
        let out = dir.path().join("frames");
        std::fs::create_dir_all(&out).unwrap();

        let err = extract_frames(&FfmpegRunner::with_binary("true"), &video, 15, 224, &out)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NoFrames(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_tool_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"x").unwrap();

        let err = extract_frames(&FfmpegRunner::with_binary("false"), &video, 15, 224, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FfmpegFailed { .. }));
    }
}
