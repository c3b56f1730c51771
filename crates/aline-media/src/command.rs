//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, parse_progress_line, FfmpegProgress};

/// Number of diagnostic stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path or pattern
    output: PathBuf,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether existing outputs may be replaced (-y) or must fail (-n)
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Fail instead of replacing existing output files.
    pub fn no_overwrite(mut self) -> Self {
        self.overwrite = false;
        self
    }

    /// Set output frame rate.
    pub fn frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set JPEG quantizer scale (2 is near-lossless).
    pub fn jpeg_quality(self, qscale: u8) -> Self {
        self.output_arg("-qscale:v").output_arg(qscale.to_string())
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        args.push(if self.overwrite { "-y" } else { "-n" }.to_string());
        args.push("-nostdin".to_string());

        args.push("-v".to_string());
        args.push("error".to_string());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Result of a successful FFmpeg run.
#[derive(Debug, Clone, Default)]
pub struct FfmpegOutcome {
    /// Last progress block reported
    pub progress: FfmpegProgress,
    /// Non-progress stderr lines (warnings), most recent last
    pub diagnostics: Vec<String>,
}

/// Runner for FFmpeg commands.
///
/// Every run resolves to either an [`FfmpegOutcome`] or a
/// [`MediaError::FfmpegFailed`] carrying the exit code and the stderr tail.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: String,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a runner using `ffmpeg` from PATH.
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }

    /// Use a different executable (resolved through PATH).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run an FFmpeg command to completion.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<FfmpegOutcome> {
        which::which(&self.binary).map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;
        let mut reader = BufReader::new(stderr).lines();

        let mut progress = FfmpegProgress::default();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        while let Some(line) = reader.next_line().await? {
            if is_progress_line(&line) {
                if let Some(snapshot) = parse_progress_line(&line, &mut progress) {
                    debug!(
                        frame = snapshot.frame,
                        out_time_ms = snapshot.out_time_ms,
                        "FFmpeg progress"
                    );
                }
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }

        let status = child.wait().await?;
        let diagnostics: Vec<String> = tail.into_iter().collect();

        if status.success() {
            if !diagnostics.is_empty() {
                warn!(
                    lines = diagnostics.len(),
                    "FFmpeg succeeded with diagnostics: {}",
                    diagnostics.join(" | ")
                );
            }
            Ok(FfmpegOutcome {
                progress,
                diagnostics,
            })
        } else {
            let stderr = if diagnostics.is_empty() {
                None
            } else {
                Some(diagnostics.join("\n"))
            };
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                stderr,
                status.code(),
            ))
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "frames/%03d.jpg")
            .no_overwrite()
            .frame_rate(15)
            .jpeg_quality(2)
            .video_filter("crop=224:224:0:0");

        let args = cmd.build_args();
        assert_eq!(args[0], "-n");
        assert!(args.contains(&"-nostdin".to_string()));
        let v = args.iter().position(|a| a == "-v").unwrap();
        assert_eq!(args[v + 1], "error");
        let r = args.iter().position(|a| a == "-r").unwrap();
        assert_eq!(args[r + 1], "15");
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "crop=224:224:0:0");
        assert_eq!(args.last().unwrap(), "frames/%03d.jpg");

        // Output args come after the input
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(input < r);
    }

    #[test]
    fn test_overwrite_default() {
        let args = FfmpegCommand::new("a.mp4", "b.mp4").build_args();
        assert_eq!(args[0], "-y");
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let runner = FfmpegRunner::with_binary("definitely-not-an-ffmpeg-binary");
        let cmd = FfmpegCommand::new("a.mp4", "b.mp4");
        let err = runner.run(&cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::FfmpegNotFound));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_reported() {
        // `false` ignores its arguments and exits with status 1
        let runner = FfmpegRunner::with_binary("false");
        let cmd = FfmpegCommand::new("a.mp4", "b.mp4");
        match runner.run(&cmd).await.unwrap_err() {
            MediaError::FfmpegFailed { exit_code, .. } => assert_eq!(exit_code, Some(1)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let runner = FfmpegRunner::with_binary("true");
        let cmd = FfmpegCommand::new("a.mp4", "b.mp4");
        let outcome = runner.run(&cmd).await.unwrap();
        assert!(outcome.diagnostics.is_empty());
    }
}
