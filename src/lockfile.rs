//! `buf.lock` reading and writing
//!
//! Supported versions:
//! - `v1beta1`: `remote`/`owner`/`repository`/`branch`/`commit`/`digest`
//! - `v1`: as `v1beta1` without `branch`
//! - `v2`: `name`/`commit`/`digest`
//!
//! A missing `version` means `v1beta1`. `v1beta1` files are written back as
//! `v1`. Digests from deprecated schemes are dropped on read.

use crate::cache::store::write_atomic;
use crate::error::{BufError, BufResult};
use crate::module::{
    parse_commit_id, Digest, DigestPolicy, ModuleFullName, ModuleKey, ModuleRef,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

pub const LOCK_FILE_NAME: &str = "buf.lock";

const HEADER: &str = "# Generated by buf. DO NOT EDIT.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileVersion {
    #[serde(rename = "v1beta1")]
    V1Beta1,
    #[serde(rename = "v1")]
    V1,
    #[serde(rename = "v2")]
    V2,
}

impl FileVersion {
    /// Version used when writing a file read as `self`
    pub fn upgraded(self) -> Self {
        match self {
            Self::V1Beta1 => Self::V1,
            other => other,
        }
    }
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::V1Beta1 => "v1beta1",
            Self::V1 => "v1",
            Self::V2 => "v2",
        };
        write!(f, "{s}")
    }
}

/// One pinned dependency
///
/// The digest is absent when the file carried none or a deprecated one; such
/// an entry is re-pinned by commit on the next update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedDep {
    pub full_name: ModuleFullName,
    pub commit_id: Uuid,
    pub digest: Option<Digest>,
}

impl LockedDep {
    pub fn from_key(key: &ModuleKey) -> BufResult<Self> {
        Ok(Self {
            full_name: key.full_name().clone(),
            commit_id: key.commit_id(),
            digest: Some(key.digest()?),
        })
    }

    /// Key for this entry, if it carries a digest
    pub fn to_key(&self) -> Option<ModuleKey> {
        self.digest
            .clone()
            .map(|d| ModuleKey::new(self.full_name.clone(), self.commit_id, d))
    }

    /// Ref pinning this entry's commit
    pub fn to_ref(&self) -> ModuleRef {
        ModuleRef::new(
            self.full_name.clone(),
            Some(self.commit_id.simple().to_string()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufLock {
    pub version: FileVersion,
    pub deps: Vec<LockedDep>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: Option<FileVersion>,
}

#[derive(Serialize, Deserialize)]
struct ExternalV1 {
    version: FileVersion,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    deps: Vec<ExternalV1Dep>,
}

#[derive(Serialize, Deserialize)]
struct ExternalV1Dep {
    remote: String,
    owner: String,
    repository: String,
    #[serde(default, skip_serializing)]
    branch: Option<String>,
    commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ExternalV2 {
    version: FileVersion,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    deps: Vec<ExternalV2Dep>,
}

#[derive(Serialize, Deserialize)]
struct ExternalV2Dep {
    name: String,
    commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
}

impl BufLock {
    pub fn new(version: FileVersion, deps: Vec<LockedDep>) -> Self {
        let mut lock = Self { version, deps };
        lock.deps.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        lock
    }

    /// Build a lock from resolved keys
    pub fn from_keys(version: FileVersion, keys: &[ModuleKey]) -> BufResult<Self> {
        let deps = keys
            .iter()
            .map(LockedDep::from_key)
            .collect::<BufResult<Vec<_>>>()?;
        Ok(Self::new(version, deps))
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(LOCK_FILE_NAME)
    }

    pub fn find(&self, full_name: &ModuleFullName) -> Option<&LockedDep> {
        self.deps.iter().find(|d| &d.full_name == full_name)
    }

    /// Read a lock file; `Ok(None)` when it does not exist
    pub fn read(path: &Path, policy: &DigestPolicy) -> BufResult<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content, path, policy).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BufError::io(format!("reading {}", path.display()), e)),
        }
    }

    pub fn parse(content: &str, path: &Path, policy: &DigestPolicy) -> BufResult<Self> {
        let invalid = |reason: String| BufError::LockFileInvalid {
            path: path.to_path_buf(),
            reason,
        };

        if content.trim().is_empty() {
            return Ok(Self::new(FileVersion::V1Beta1, Vec::new()));
        }
        let header: VersionHeader =
            serde_yaml::from_str(content).map_err(|e| invalid(e.to_string()))?;
        let version = header.version.unwrap_or(FileVersion::V1Beta1);

        let digest = |raw: Option<String>| -> BufResult<Option<Digest>> {
            match raw {
                None => Ok(None),
                Some(raw) => policy
                    .parse_lenient(&raw)
                    .map_err(|e| invalid(e.to_string())),
            }
        };
        let commit = |raw: &str| parse_commit_id(raw).map_err(|e| invalid(e.to_string()));

        let deps = match version {
            FileVersion::V1Beta1 | FileVersion::V1 => {
                #[derive(Deserialize)]
                struct Loose {
                    #[serde(default)]
                    deps: Vec<ExternalV1Dep>,
                }
                let file: Loose =
                    serde_yaml::from_str(content).map_err(|e| invalid(e.to_string()))?;
                file.deps
                    .into_iter()
                    .map(|d| {
                        if let Some(branch) = &d.branch {
                            debug!("Ignoring branch {} of {}/{}", branch, d.owner, d.repository);
                        }
                        Ok(LockedDep {
                            full_name: ModuleFullName::new(d.remote, d.owner, d.repository)
                                .map_err(|e| invalid(e.to_string()))?,
                            commit_id: commit(&d.commit)?,
                            digest: digest(d.digest)?,
                        })
                    })
                    .collect::<BufResult<Vec<_>>>()?
            }
            FileVersion::V2 => {
                let file: ExternalV2 =
                    serde_yaml::from_str(content).map_err(|e| invalid(e.to_string()))?;
                file.deps
                    .into_iter()
                    .map(|d| {
                        Ok(LockedDep {
                            full_name: ModuleFullName::parse(&d.name)
                                .map_err(|e| invalid(e.to_string()))?,
                            commit_id: commit(&d.commit)?,
                            digest: digest(d.digest)?,
                        })
                    })
                    .collect::<BufResult<Vec<_>>>()?
            }
        };

        debug!("Read {} ({}, {} deps)", path.display(), version, deps.len());
        Ok(Self::new(version, deps))
    }

    /// Serialize with the generated-file header; `v1beta1` is written as `v1`
    pub fn to_yaml(&self) -> BufResult<String> {
        let version = self.version.upgraded();
        let body = match version {
            FileVersion::V1Beta1 | FileVersion::V1 => serde_yaml::to_string(&ExternalV1 {
                version,
                deps: self
                    .deps
                    .iter()
                    .map(|d| ExternalV1Dep {
                        remote: d.full_name.registry().to_string(),
                        owner: d.full_name.owner().to_string(),
                        repository: d.full_name.name().to_string(),
                        branch: None,
                        commit: d.commit_id.simple().to_string(),
                        digest: d.digest.as_ref().map(ToString::to_string),
                    })
                    .collect(),
            })?,
            FileVersion::V2 => serde_yaml::to_string(&ExternalV2 {
                version,
                deps: self
                    .deps
                    .iter()
                    .map(|d| ExternalV2Dep {
                        name: d.full_name.to_string(),
                        commit: d.commit_id.simple().to_string(),
                        digest: d.digest.as_ref().map(ToString::to_string),
                    })
                    .collect(),
            })?,
        };
        Ok(format!("{HEADER}{body}"))
    }

    /// Atomically replace the file at `path`
    pub fn write(&self, path: &Path) -> BufResult<()> {
        write_atomic(path, self.to_yaml()?.as_bytes())?;
        debug!("Wrote {} with {} deps", path.display(), self.deps.len());
        Ok(())
    }
}
