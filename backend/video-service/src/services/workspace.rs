/// Per-job temp workspace
///
/// Every pipeline invocation gets its own directory under the configured
/// media root, scoped by lesson id plus a job id so concurrent jobs for the
/// same lesson cannot collide. `close` removes the tree; `Drop` is the
/// best-effort backstop for early returns, so a failure mid-pipeline cannot
/// leak disk across many uploads.
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;

pub struct TempWorkspace {
    root: PathBuf,
    released: bool,
}

impl TempWorkspace {
    pub async fn create(base: &Path, lesson_id: Uuid) -> Result<Self> {
        let root = base.join(format!("{}-{}", lesson_id, Uuid::new_v4()));
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Create a subdirectory inside the workspace
    pub async fn subdir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.root.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Remove the workspace tree. Called on success and failure paths alike.
    pub async fn close(mut self) -> Result<()> {
        self.released = true;
        tokio::fs::remove_dir_all(&self.root).await?;
        Ok(())
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = std::fs::remove_dir_all(&self.root) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.root.display(), "workspace cleanup on drop failed: {}", err);
                }
            }
        }
    }
}
