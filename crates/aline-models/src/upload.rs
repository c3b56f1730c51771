//! Upload classification and filename sanitization.

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Extensions accepted by the video upload endpoint.
pub const VIDEO_EXTENSIONS: &[&str] = &["avi", "mpg", "mpeg", "mkv", "webm", "mp4", "mov"];

/// Extensions accepted by the image upload endpoint.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "bmp", "tiff", "png", "gif"];

const MAX_FILENAME_LENGTH: usize = 255;

/// Kind of media a request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    Video,
    Image,
}

impl UploadKind {
    /// Accepted extensions for this kind.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            UploadKind::Video => VIDEO_EXTENSIONS,
            UploadKind::Image => IMAGE_EXTENSIONS,
        }
    }

    /// Multipart field name used by the upload endpoints.
    pub fn field_name(&self) -> &'static str {
        match self {
            UploadKind::Video => "video",
            UploadKind::Image => "image",
        }
    }

    /// Whether `file_name` has an extension accepted for this kind.
    pub fn accepts(&self, file_name: &str) -> bool {
        extension_of(file_name)
            .map(|ext| self.extensions().contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Validate and sanitize an uploaded filename for this kind.
    pub fn validate_filename(&self, file_name: &str) -> ModelResult<String> {
        if !self.accepts(file_name) {
            return Err(ModelError::invalid_upload("Invalid file"));
        }
        let sanitized = sanitize_filename(file_name);
        if sanitized.is_empty() || !self.accepts(&sanitized) {
            return Err(ModelError::invalid_upload("Invalid file"));
        }
        Ok(sanitized)
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Path separators become underscores, anything outside `[A-Za-z0-9._-]` is
/// dropped, whitespace runs collapse to `_`, and leading dots/underscores are
/// stripped so the result can never be `..` or a hidden file.
pub fn sanitize_filename(file_name: &str) -> String {
    let replaced: String = file_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = replaced.split_whitespace().collect::<Vec<_>>().join("_");

    let filtered: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let trimmed = filtered.trim_matches(|c| c == '.' || c == '_');
    trimmed.chars().take(MAX_FILENAME_LENGTH).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_by_kind() {
        assert!(UploadKind::Video.accepts("clip.webm"));
        assert!(UploadKind::Video.accepts("CLIP.MP4"));
        assert!(!UploadKind::Video.accepts("photo.jpeg"));
        assert!(UploadKind::Image.accepts("photo.jpeg"));
        assert!(!UploadKind::Image.accepts("notes.txt"));
        assert!(!UploadKind::Video.accepts("mp4"));
    }

    #[test]
    fn test_extension_must_be_suffix() {
        // Substring matches are not enough
        assert!(!UploadKind::Video.accepts("movie.mp4.exe"));
        assert!(!UploadKind::Image.accepts("jpgfile"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Clip.mp4"), "My_Clip.mp4");
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("..\\win\\file.avi"), "win_file.avi");
        assert_eq!(sanitize_filename(".hidden.png"), "hidden.png");
        assert_eq!(sanitize_filename("ümlaut.gif"), "mlaut.gif");
    }

    #[test]
    fn test_validate_filename() {
        assert_eq!(
            UploadKind::Video.validate_filename("my video.webm").unwrap(),
            "my_video.webm"
        );
        assert!(UploadKind::Video.validate_filename("image.png").is_err());
        assert!(UploadKind::Image.validate_filename("../.png").is_err());
    }
}
