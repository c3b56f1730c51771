//! Per-request working directories.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use aline_media::{prepare_empty_dir, remove_dir, CleanupReport};

use crate::error::WorkerResult;

/// `<work_dir>/<request id>/{frames,flows}`, owned by one request.
#[derive(Debug)]
pub struct RequestWorkspace {
    root: PathBuf,
    frames: PathBuf,
    flows: PathBuf,
}

impl RequestWorkspace {
    /// Create empty `frames` and `flows` directories for `request_id`.
    ///
    /// On failure nothing is left under `work_dir` for this request.
    pub async fn create(work_dir: impl AsRef<Path>, request_id: &Uuid) -> WorkerResult<Self> {
        let root = work_dir.as_ref().join(request_id.to_string());
        let frames = root.join("frames");
        let flows = root.join("flows");

        let prepared = match prepare_empty_dir(&frames).await {
            Ok(_) => prepare_empty_dir(&flows).await,
            Err(e) => Err(e),
        };
        if let Err(e) = prepared {
            remove_dir(&root).await.log(&request_id.to_string());
            return Err(e.into());
        }

        Ok(Self {
            root,
            frames,
            flows,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> &Path {
        &self.frames
    }

    pub fn flows_dir(&self) -> &Path {
        &self.flows
    }

    /// Remove the whole workspace, reporting every path that survived.
    pub async fn cleanup(self) -> CleanupReport {
        remove_dir(&self.root).await
    }
}
