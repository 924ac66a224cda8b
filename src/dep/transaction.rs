//! Snapshot-and-restore guard around a lock file update

use crate::cache::store::write_atomic;
use crate::error::{BufError, BufResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Holds the previous content of a lock file until the update commits
///
/// Dropping the guard without `commit` or `rollback` (for example when the
/// update future is cancelled) restores the previous content.
#[derive(Debug)]
pub struct LockTransaction {
    path: PathBuf,
    previous: Option<Vec<u8>>,
    done: bool,
}

impl LockTransaction {
    /// Snapshot the file at `path`; a missing file is restored by removal
    pub fn begin(path: &Path) -> BufResult<Self> {
        let previous = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(BufError::io(format!("reading {}", path.display()), e)),
        };
        Ok(Self {
            path: path.to_path_buf(),
            previous,
            done: false,
        })
    }

    pub fn commit(mut self) {
        self.done = true;
    }

    /// Restore the snapshot and wrap `cause` with the outcome
    pub fn rollback(mut self, cause: BufError) -> BufError {
        self.done = true;
        let source = Box::new(cause);
        match self.restore() {
            Ok(()) => {
                warn!("Restored {} after failed update", self.path.display());
                BufError::LockUpdateRolledBack {
                    path: self.path.clone(),
                    source,
                }
            }
            Err(e) => BufError::LockRestoreFailed {
                path: self.path.clone(),
                source,
                restore: e.to_string(),
            },
        }
    }

    fn restore(&self) -> BufResult<()> {
        match &self.previous {
            Some(bytes) => write_atomic(&self.path, bytes),
            None => match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(BufError::io(format!("removing {}", self.path.display()), e)),
            },
        }
    }
}

impl Drop for LockTransaction {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        debug!("Lock update for {} interrupted", self.path.display());
        if let Err(e) = self.restore() {
            warn!("Failed to restore {}: {}", self.path.display(), e);
        }
    }
}
