//! Inter-process file locks guarding cache entries
//!
//! Each cache entry has a lock file under the lock directory. Readers take a
//! shared lock, writers an exclusive one. Locks are held by a `LockGuard`
//! and released when it drops, on success and error paths alike.

use crate::error::{BufError, BufResult};
use fs4::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lock mode held by a guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Hands out file locks rooted at one directory
#[derive(Debug, Clone)]
pub struct FileLocker {
    root: PathBuf,
}

/// A held file lock, released on drop
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

impl FileLocker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lock file path for a slash-separated lock name
    pub fn lock_path(&self, name: &Path) -> PathBuf {
        let mut path = self.root.join(name);
        let file_name = path
            .file_name()
            .map(|n| format!("{}.lock", n.to_string_lossy()))
            .unwrap_or_else(|| "root.lock".to_string());
        path.set_file_name(file_name);
        path
    }

    /// Block until an exclusive lock is held
    pub fn lock(&self, name: &Path) -> BufResult<LockGuard> {
        let (file, path) = self.open(name)?;
        FileExt::lock_exclusive(&file).map_err(|e| BufError::Lock {
            path: path.clone(),
            source: e,
        })?;
        debug!("Acquired exclusive lock {}", path.display());
        Ok(LockGuard {
            file,
            path,
            mode: LockMode::Exclusive,
        })
    }

    /// Block until a shared lock is held
    pub fn rlock(&self, name: &Path) -> BufResult<LockGuard> {
        let (file, path) = self.open(name)?;
        FileExt::lock_shared(&file).map_err(|e| BufError::Lock {
            path: path.clone(),
            source: e,
        })?;
        debug!("Acquired shared lock {}", path.display());
        Ok(LockGuard {
            file,
            path,
            mode: LockMode::Shared,
        })
    }

    /// Run `f` while holding an exclusive lock
    pub fn with_lock<T>(&self, name: &Path, f: impl FnOnce() -> BufResult<T>) -> BufResult<T> {
        let _guard = self.lock(name)?;
        f()
    }

    /// Run `f` while holding a shared lock
    pub fn with_rlock<T>(&self, name: &Path, f: impl FnOnce() -> BufResult<T>) -> BufResult<T> {
        let _guard = self.rlock(name)?;
        f()
    }

    fn open(&self, name: &Path) -> BufResult<(File, PathBuf)> {
        let path = self.lock_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BufError::io(format!("creating lock directory {}", parent.display()), e)
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| BufError::io(format!("opening lock file {}", path.display()), e))?;
        Ok((file, path))
    }
}
