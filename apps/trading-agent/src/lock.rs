//! Single-instance process guard.
//!
//! A non-blocking advisory exclusive lock on a well-known file. A second
//! invocation fails immediately instead of queueing, and the lock is released
//! on every exit path (including panics) because release happens in `Drop`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::PipelineError;

/// Held exclusive lock for the lifetime of one run.
#[derive(Debug)]
pub struct ProcessGuard {
    file: File,
    path: PathBuf,
}

impl ProcessGuard {
    /// Try to take the lock. Fails with [`PipelineError::LockContention`]
    /// without blocking when another process holds it.
    pub fn acquire(path: &Path) -> Result<Self, PipelineError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|source| PipelineError::LockIo {
                path: path.display().to_string(),
                source,
            })?;

        file.try_lock_exclusive()
            .map_err(|_| PipelineError::LockContention {
                path: path.display().to_string(),
            })?;

        tracing::debug!(path = %path.display(), "Process lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        // The file is never unlinked: removing the path would let one later
        // instance lock a stale inode while another locks a fresh one, and
        // both would hold "the" exclusive lock. A persistent empty lock file
        // is harmless.
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release process lock");
        }
        tracing::debug!(path = %self.path.display(), "Process lock released");
    }
}
