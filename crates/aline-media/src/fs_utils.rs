//! Filesystem utilities for per-request working directories.
//!
//! Cleanup never stops at the first failure: every entry is attempted and
//! each failure is recorded in a [`CleanupReport`] so callers can log it.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Outcome of a cleanup pass.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Paths that were removed
    pub removed: Vec<PathBuf>,
    /// Paths that could not be removed, with the reason
    pub failures: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    /// True when nothing failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, path: &Path, err: std::io::Error) {
        self.failures.push((path.to_path_buf(), err.to_string()));
    }

    /// Emit the report through tracing.
    pub fn log(&self, context: &str) {
        if self.is_clean() {
            debug!(context, removed = self.removed.len(), "Cleanup complete");
            return;
        }
        for (path, reason) in &self.failures {
            warn!(context, path = %path.display(), reason = %reason, "Cleanup failed for path");
        }
    }
}

/// Remove every entry inside `dir`, keeping `dir` itself.
///
/// A missing directory is already clean.
pub async fn clear_dir(dir: impl AsRef<Path>) -> CleanupReport {
    let dir = dir.as_ref();
    let mut report = CleanupReport::default();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
        Err(e) => {
            report.fail(dir, e);
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                report.fail(dir, e);
                break;
            }
        };

        let path = entry.path();
        let result = match entry.file_type().await {
            Ok(ft) if ft.is_dir() => fs::remove_dir_all(&path).await,
            Ok(_) => fs::remove_file(&path).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => report.removed.push(path),
            Err(e) => report.fail(&path, e),
        }
    }

    report
}

/// Remove `dir` and everything below it.
pub async fn remove_dir(dir: impl AsRef<Path>) -> CleanupReport {
    let dir = dir.as_ref();
    let mut report = clear_dir(dir).await;

    match fs::remove_dir(dir).await {
        Ok(()) => report.removed.push(dir.to_path_buf()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => report.fail(dir, e),
    }

    report
}

/// Ensure `dir` exists and is empty.
///
/// Fails if any stale entry survives, since later stages must not mix old and
/// new files.
pub async fn prepare_empty_dir(dir: impl AsRef<Path>) -> MediaResult<CleanupReport> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).await?;

    let report = clear_dir(dir).await;

    if let Some((path, reason)) = report.failures.first() {
        return Err(MediaError::invalid_layout(
            dir,
            format!("could not clear {}: {}", path.display(), reason),
        ));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_clear_dir_removes_files_and_subdirs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("001.jpg"), b"x").await.unwrap();
        fs::create_dir_all(dir.path().join("nested/deeper")).await.unwrap();
        fs::write(dir.path().join("nested/deeper/X000.jpg"), b"x").await.unwrap();

        let report = clear_dir(dir.path()).await;

        assert!(report.is_clean());
        assert_eq!(report.removed.len(), 2);
        assert!(dir.path().exists());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_clear_missing_dir_is_clean() {
        let dir = TempDir::new().unwrap();
        let report = clear_dir(dir.path().join("missing")).await;
        assert!(report.is_clean());
        assert!(report.removed.is_empty());
    }

    #[tokio::test]
    async fn test_clear_file_path_reports_failure() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").await.unwrap();

        let report = clear_dir(&file).await;
        assert!(!report.is_clean());
        assert_eq!(report.failures[0].0, file);
    }

    #[tokio::test]
    async fn test_remove_dir() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("req");
        fs::create_dir_all(target.join("frames")).await.unwrap();
        fs::write(target.join("frames/001.jpg"), b"x").await.unwrap();

        let report = remove_dir(&target).await;
        assert!(report.is_clean());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_prepare_empty_dir() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("frames");
        fs::create_dir_all(&target).await.unwrap();
        fs::write(target.join("stale.jpg"), b"x").await.unwrap();

        let report = prepare_empty_dir(&target).await.unwrap();
        assert_eq!(report.removed.len(), 1);
        assert!(target.exists());
        assert!(!target.join("stale.jpg").exists());
    }
}
