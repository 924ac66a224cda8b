//! Module keys: a module name pinned to a commit, with a memoized digest

use crate::error::{BufError, BufResult};
use crate::module::digest::Digest;
use crate::module::full_name::ModuleFullName;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

type DigestFn = Box<dyn Fn() -> BufResult<Digest> + Send + Sync>;

/// A specific, content-addressable version of a module
///
/// Identity is the full name plus commit ID. The digest may be supplied up
/// front or computed on first access; either way it is computed at most once
/// and every later call returns the same value.
#[derive(Clone)]
pub struct ModuleKey {
    inner: Arc<KeyInner>,
}

struct KeyInner {
    full_name: ModuleFullName,
    commit_id: Uuid,
    digest: OnceLock<Result<Digest, String>>,
    compute: Option<DigestFn>,
}

impl ModuleKey {
    /// Create a key with a known digest
    pub fn new(full_name: ModuleFullName, commit_id: Uuid, digest: Digest) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Ok(digest));
        Self {
            inner: Arc::new(KeyInner {
                full_name,
                commit_id,
                digest: cell,
                compute: None,
            }),
        }
    }

    /// Create a key whose digest is computed on first access
    pub fn new_lazy<F>(full_name: ModuleFullName, commit_id: Uuid, compute: F) -> Self
    where
        F: Fn() -> BufResult<Digest> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(KeyInner {
                full_name,
                commit_id,
                digest: OnceLock::new(),
                compute: Some(Box::new(compute)),
            }),
        }
    }

    pub fn full_name(&self) -> &ModuleFullName {
        &self.inner.full_name
    }

    pub fn commit_id(&self) -> Uuid {
        self.inner.commit_id
    }

    /// Commit ID in the 32 character form used on disk and in lock files
    pub fn dashless_commit_id(&self) -> String {
        self.inner.commit_id.simple().to_string()
    }

    /// Get the digest, computing it if needed
    pub fn digest(&self) -> BufResult<Digest> {
        let result = self.inner.digest.get_or_init(|| match &self.inner.compute {
            Some(compute) => compute().map_err(|e| e.to_string()),
            None => Err("no digest available".to_string()),
        });
        result.clone().map_err(|reason| BufError::DigestCompute {
            key: self.to_string(),
            reason,
        })
    }

    /// Relative cache path: `registry/owner/name/commit`
    pub fn cache_path(&self) -> PathBuf {
        let name = self.full_name();
        PathBuf::from(name.registry())
            .join(name.owner())
            .join(name.name())
            .join(self.dashless_commit_id())
    }
}

/// Parse a commit ID in dashless or hyphenated form
pub fn parse_commit_id(s: &str) -> BufResult<Uuid> {
    Uuid::parse_str(s).map_err(|_| BufError::InvalidCommitId(s.to_string()))
}

impl PartialEq for ModuleKey {
    fn eq(&self, other: &Self) -> bool {
        self.inner.full_name == other.inner.full_name
            && self.inner.commit_id == other.inner.commit_id
    }
}

impl Eq for ModuleKey {}

impl Hash for ModuleKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.full_name.hash(state);
        self.inner.commit_id.hash(state);
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.full_name(), self.dashless_commit_id())
    }
}

impl fmt::Debug for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleKey")
            .field("full_name", &self.inner.full_name.to_string())
            .field("commit_id", &self.dashless_commit_id())
            .field("digest", &self.inner.digest.get())
            .finish()
    }
}
