//! Versioned cache directory layout
//!
//! Every on-disk cache lives under one base directory. Each layout
//! generation gets its own subtree so old and new layouts never collide:
//!
//! ```text
//! <base>/
//!   v1/module/{data,lock,sum}     (retired)
//!   v2/module                     (retired)
//!   v3/modules                    module content
//!   v3/commits                    commit metadata
//!   v3/wellknowntypes             well-known types content
//!   v3/modulelocks                lock files guarding the entries above
//!   v3/wasmruntime                compiled plugin runtime cache
//! ```
//!
//! Retired generations are only listed so `buf cache clear` can remove them.

use crate::error::{BufError, BufResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the base cache directory
pub const CACHE_DIR_ENV: &str = "BUF_CACHE_DIR";

/// Permission bits the owner needs on every cache directory
#[cfg(unix)]
const REQUIRED_MODE: u32 = 0o700;

/// Logical cache categories across all layout generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCategory {
    V1ModuleData,
    V1ModuleLock,
    V1ModuleSum,
    V2Module,
    V3Modules,
    V3Commits,
    V3WellKnownTypes,
    V3ModuleLocks,
    V3WasmRuntime,
}

impl CacheCategory {
    /// Slash-separated path relative to the base cache directory
    pub fn relative_path(&self) -> &'static str {
        match self {
            Self::V1ModuleData => "v1/module/data",
            Self::V1ModuleLock => "v1/module/lock",
            Self::V1ModuleSum => "v1/module/sum",
            Self::V2Module => "v2/module",
            Self::V3Modules => "v3/modules",
            Self::V3Commits => "v3/commits",
            Self::V3WellKnownTypes => "v3/wellknowntypes",
            Self::V3ModuleLocks => "v3/modulelocks",
            Self::V3WasmRuntime => "v3/wasmruntime",
        }
    }

    /// Every category of every generation
    pub fn all() -> &'static [Self] {
        &[
            Self::V1ModuleData,
            Self::V1ModuleLock,
            Self::V1ModuleSum,
            Self::V2Module,
            Self::V3Modules,
            Self::V3Commits,
            Self::V3WellKnownTypes,
            Self::V3ModuleLocks,
            Self::V3WasmRuntime,
        ]
    }

    /// Categories used by the current layout
    pub fn current() -> &'static [Self] {
        &[
            Self::V3Modules,
            Self::V3Commits,
            Self::V3WellKnownTypes,
            Self::V3ModuleLocks,
            Self::V3WasmRuntime,
        ]
    }
}

/// Resolves cache categories to directories under a base path
#[derive(Debug, Clone)]
pub struct CacheDirs {
    base: PathBuf,
}

impl CacheDirs {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Default base directory (`<cache_dir>/buf`)
    pub fn default_base() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("buf")
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of a category without touching the filesystem
    pub fn path(&self, category: CacheCategory) -> PathBuf {
        category
            .relative_path()
            .split('/')
            .fold(self.base.clone(), |path, component| path.join(component))
    }

    /// Return the directory for a category, creating and validating it
    pub fn ensure(&self, category: CacheCategory) -> BufResult<PathBuf> {
        let path = self.path(category);
        ensure_dir(&path)?;
        Ok(path)
    }

    /// Ensure every category of the current layout
    pub fn ensure_current(&self) -> BufResult<Vec<PathBuf>> {
        CacheCategory::current()
            .iter()
            .map(|category| self.ensure(*category))
            .collect()
    }

    /// Remove every category of every generation, returning what was removed
    pub fn clear(&self) -> BufResult<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for category in CacheCategory::all() {
            let path = self.path(*category);
            match fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => {
                    fs::remove_dir_all(&path).map_err(|e| {
                        BufError::io(format!("removing cache directory {}", path.display()), e)
                    })?;
                }
                Ok(_) => {
                    fs::remove_file(&path).map_err(|e| {
                        BufError::io(format!("removing cache file {}", path.display()), e)
                    })?;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(BufError::io(format!("inspecting {}", path.display()), e));
                }
            }
            debug!("Removed cache path {}", path.display());
            removed.push(path);
        }
        info!("Cleared {} cache path(s) under {}", removed.len(), self.base.display());
        Ok(removed)
    }
}

/// Create a directory with owner rwx if missing, or validate an existing one
pub fn ensure_dir(path: &Path) -> BufResult<()> {
    match fs::metadata(path) {
        Ok(meta) => {
            if !meta.is_dir() {
                return Err(BufError::CacheDirNotDirectory {
                    path: path.to_path_buf(),
                    env_var: CACHE_DIR_ENV,
                });
            }
            check_permissions(path, &meta)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => create_dir(path),
        Err(e) => Err(BufError::io(format!("inspecting {}", path.display()), e)),
    }
}

#[cfg(unix)]
fn create_dir(path: &Path) -> BufResult<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new()
        .recursive(true)
        .mode(REQUIRED_MODE)
        .create(path)
        .map_err(|e| BufError::io(format!("creating cache directory {}", path.display()), e))?;
    debug!("Created cache directory {}", path.display());
    Ok(())
}

#[cfg(not(unix))]
fn create_dir(path: &Path) -> BufResult<()> {
    fs::create_dir_all(path)
        .map_err(|e| BufError::io(format!("creating cache directory {}", path.display()), e))?;
    debug!("Created cache directory {}", path.display());
    Ok(())
}

#[cfg(unix)]
fn check_permissions(path: &Path, meta: &fs::Metadata) -> BufResult<()> {
    use std::os::unix::fs::PermissionsExt;

    if meta.permissions().mode() & REQUIRED_MODE != REQUIRED_MODE {
        return Err(BufError::CacheDirNotWritable {
            path: path.to_path_buf(),
            env_var: CACHE_DIR_ENV,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(path: &Path, meta: &fs::Metadata) -> BufResult<()> {
    if meta.permissions().readonly() {
        return Err(BufError::CacheDirNotWritable {
            path: path.to_path_buf(),
            env_var: CACHE_DIR_ENV,
        });
    }
    Ok(())
}
