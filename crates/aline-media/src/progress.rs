//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg's `-progress pipe:2` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Frames written so far
    pub frame: u64,
    /// Current processing FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Whether FFmpeg reported `progress=end`
    pub is_complete: bool,
}

/// Whether a stderr line belongs to the progress protocol.
pub fn is_progress_line(line: &str) -> bool {
    matches!(
        line.trim().split_once('=').map(|(k, _)| k),
        Some(
            "frame"
                | "fps"
                | "stream_0_0_q"
                | "bitrate"
                | "total_size"
                | "out_time_us"
                | "out_time_ms"
                | "out_time"
                | "dup_frames"
                | "drop_frames"
                | "speed"
                | "progress"
        )
    )
}

/// Fold one progress line into `current`.
///
/// Returns a snapshot when a `progress=` line closes a block.
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;

    match key {
        "out_time_ms" | "out_time_us" => {
            if let Ok(us) = value.parse::<i64>() {
                // Both keys carry microseconds in current FFmpeg builds
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        assert!(parse_progress_line("frame=45", &mut progress).is_none());
        assert_eq!(progress.frame, 45);

        parse_progress_line("out_time_us=3000000", &mut progress);
        assert_eq!(progress.out_time_ms, 3000);

        let snapshot = parse_progress_line("progress=end", &mut progress).unwrap();
        assert!(snapshot.is_complete);
        assert_eq!(snapshot.frame, 45);
    }

    #[test]
    fn test_progress_line_detection() {
        assert!(is_progress_line("frame=12"));
        assert!(is_progress_line("progress=continue"));
        assert!(!is_progress_line("[mjpeg @ 0x55] error while decoding"));
        assert!(!is_progress_line("File '/tmp/001.jpg' already exists. Exiting."));
    }
}
