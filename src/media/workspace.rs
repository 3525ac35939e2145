//! Scratch directory management.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Directory holding per-message temporary files.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Creates a workspace rooted at `root`. The directory must already exist.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a sub-directory for one job.
    ///
    /// Call [`ScratchDir::close`] when the job is done; dropping it without
    /// closing removes the directory synchronously.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn scope(&self, name: &str) -> std::io::Result<ScratchDir> {
        let path = self.root.join(name);
        tokio::fs::create_dir_all(&path).await?;
        Ok(ScratchDir {
            workspace: Self::new(path),
            closed: false,
        })
    }

    /// Reserves a file with an already formatted name.
    #[must_use]
    pub fn named(&self, file_name: &str) -> ScratchFile {
        ScratchFile {
            path: self.root.join(file_name),
        }
    }
}

/// Formats a scratch file name.
#[must_use]
pub fn scratch_name(prefix: &str, message_id: i32, extension: &str) -> String {
    format!("{prefix}_{message_id}.{extension}")
}

/// A job-private directory inside the workspace.
#[derive(Debug)]
pub struct ScratchDir {
    workspace: Workspace,
    closed: bool,
}

impl ScratchDir {
    /// Workspace rooted at this directory.
    #[must_use]
    pub const fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Removes the directory and everything in it without blocking the runtime.
    pub async fn close(mut self) {
        self.closed = true;
        let root = self.workspace.root();
        match tokio::fs::remove_dir_all(root).await {
            Ok(()) => debug!("Removed scratch directory {}", root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", root.display(), e),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let root = self.workspace.root();
        match std::fs::remove_dir_all(root) {
            Ok(()) => debug!("Removed scratch directory {}", root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", root.display(), e),
        }
    }
}

/// A path in the workspace whose file is deleted on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Path of the scratch file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

}

impl AsRef<Path> for ScratchFile {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed scratch file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}
