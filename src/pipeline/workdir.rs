// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Scratch directory owned by a single pipeline run.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AnnotateError, Result};

const FRAMES_DIR: &str = "frames";
const ANNOTATED_DIR: &str = "annotated";

/// Working directory with `frames/` and `annotated/` subdirectories.
///
/// Removed by [`WorkDir::cleanup`], or on drop if cleanup was never reached.
#[derive(Debug)]
pub struct WorkDir {
    root: PathBuf,
    frames: PathBuf,
    annotated: PathBuf,
    removed: bool,
}

impl WorkDir {
    /// Create a fresh working directory at `root`.
    ///
    /// Anything already at `root` is left over from an earlier run and deleted.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotateError::WorkingDirectoryConflict`] if `root` exists but is
    /// not a directory, or the directory cannot be cleared or created.
    pub fn prepare<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let conflict = |what: &str, e: std::io::Error| {
            AnnotateError::WorkingDirectoryConflict(format!("{what} {}: {e}", root.display()))
        };

        if root.exists() {
            if !root.is_dir() {
                return Err(AnnotateError::WorkingDirectoryConflict(format!(
                    "{} exists and is not a directory",
                    root.display()
                )));
            }
            tracing::warn!(dir = %root.display(), "removing stale working directory");
            fs::remove_dir_all(&root).map_err(|e| conflict("failed to clear", e))?;
        }

        let frames = root.join(FRAMES_DIR);
        let annotated = root.join(ANNOTATED_DIR);
        fs::create_dir_all(&frames).map_err(|e| conflict("failed to create", e))?;
        fs::create_dir_all(&annotated).map_err(|e| conflict("failed to create", e))?;

        Ok(Self {
            root,
            frames,
            annotated,
            removed: false,
        })
    }

    /// Root of the working directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding extracted frames.
    #[must_use]
    pub fn frames_dir(&self) -> &Path {
        &self.frames
    }

    /// Directory holding annotated frames.
    #[must_use]
    pub fn annotated_dir(&self) -> &Path {
        &self.annotated
    }

    /// Delete the working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be removed.
    pub fn cleanup(mut self) -> Result<()> {
        self.removed = true;
        match fs::remove_dir_all(&self.root) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if !self.removed
            && let Err(e) = fs::remove_dir_all(&self.root)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(dir = %self.root.display(), error = %e, "failed to remove working directory");
        }
    }
}
