//! On-disk buckets for module content and commit metadata
//!
//! Entries are keyed by `registry/owner/name/commit`. Writes are staged in a
//! temporary path next to the entry and renamed into place, so a reader
//! never sees a partially written entry at the final path.
//!
//! Module content layout:
//! ```text
//! <root>/<registry>/<owner>/<name>/<commit>/
//!   module.json    entry manifest (name, commit, digest, deps, file list)
//!   files/...      module files
//! ```
//!
//! Commit layout:
//! ```text
//! <root>/<registry>/<owner>/<name>/<commit>.json
//! ```

use crate::error::{BufError, BufResult};
use crate::module::{parse_commit_id, Commit, Digest, ModuleData, ModuleFullName, ModuleKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const MANIFEST_FILE: &str = "module.json";
const FILES_DIR: &str = "files";

/// Storage for one kind of cached value, keyed by module key
pub trait Bucket<T>: Send + Sync {
    /// Read an entry; `Ok(None)` when absent, `CacheCorrupt` when unreadable
    fn read(&self, key: &ModuleKey) -> BufResult<Option<T>>;

    /// Atomically replace the entry for `key`
    fn write(&self, key: &ModuleKey, value: &T) -> BufResult<()>;

    /// Remove the entry if present
    fn delete(&self, key: &ModuleKey) -> BufResult<()>;

    /// Short name used to namespace lock files
    fn label(&self) -> &'static str;
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryManifest {
    name: ModuleFullName,
    commit: String,
    digest: Digest,
    deps: Vec<DepRecord>,
    files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DepRecord {
    name: ModuleFullName,
    commit: String,
    digest: Digest,
}

impl DepRecord {
    fn from_key(key: &ModuleKey) -> BufResult<Self> {
        Ok(Self {
            name: key.full_name().clone(),
            commit: key.dashless_commit_id(),
            digest: key.digest()?,
        })
    }

    fn into_key(self) -> BufResult<ModuleKey> {
        Ok(ModuleKey::new(
            self.name,
            parse_commit_id(&self.commit)?,
            self.digest,
        ))
    }
}

/// Content-addressed store of module files
#[derive(Debug, Clone)]
pub struct ModuleDataStore {
    root: PathBuf,
    label: &'static str,
}

impl ModuleDataStore {
    pub fn new(root: impl Into<PathBuf>, label: &'static str) -> Self {
        Self {
            root: root.into(),
            label,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, key: &ModuleKey) -> PathBuf {
        self.root.join(key.cache_path())
    }

    fn corrupt(path: &Path, reason: impl Into<String>) -> BufError {
        BufError::CacheCorrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

impl Bucket<ModuleData> for ModuleDataStore {
    fn read(&self, key: &ModuleKey) -> BufResult<Option<ModuleData>> {
        let dir = self.entry_dir(key);
        let manifest_path = dir.join(MANIFEST_FILE);
        let bytes = match fs::read(&manifest_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if dir.exists() {
                    return Err(Self::corrupt(&dir, "missing module.json"));
                }
                return Ok(None);
            }
            Err(e) => {
                return Err(BufError::io(
                    format!("reading {}", manifest_path.display()),
                    e,
                ))
            }
        };

        let manifest: EntryManifest = serde_json::from_slice(&bytes)
            .map_err(|e| Self::corrupt(&manifest_path, e.to_string()))?;
        if manifest.name != *key.full_name()
            || parse_commit_id(&manifest.commit).ok() != Some(key.commit_id())
        {
            return Err(Self::corrupt(
                &manifest_path,
                format!("entry is for {}:{}", manifest.name, manifest.commit),
            ));
        }

        let deps = manifest
            .deps
            .into_iter()
            .map(DepRecord::into_key)
            .collect::<BufResult<Vec<_>>>()
            .map_err(|e| Self::corrupt(&manifest_path, e.to_string()))?;

        let files_dir = dir.join(FILES_DIR);
        let mut files = BTreeMap::new();
        for path in manifest.files {
            let file_path = files_dir.join(checked_relative_path(&path)?);
            let content = fs::read(&file_path).map_err(|e| match e.kind() {
                ErrorKind::NotFound => Self::corrupt(&file_path, "missing file"),
                _ => BufError::io(format!("reading {}", file_path.display()), e),
            })?;
            files.insert(path, content);
        }

        Ok(Some(ModuleData::new(key.clone(), files, deps)))
    }

    fn write(&self, key: &ModuleKey, value: &ModuleData) -> BufResult<()> {
        let dest = self.entry_dir(key);
        let parent = dest
            .parent()
            .ok_or_else(|| BufError::internal(format!("no parent for {}", dest.display())))?;
        fs::create_dir_all(parent)
            .map_err(|e| BufError::io(format!("creating {}", parent.display()), e))?;

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(parent)
            .map_err(|e| BufError::io(format!("creating staging dir in {}", parent.display()), e))?;

        let files_dir = staging.path().join(FILES_DIR);
        for (path, content) in value.files() {
            let file_path = files_dir.join(checked_relative_path(path)?);
            if let Some(file_parent) = file_path.parent() {
                fs::create_dir_all(file_parent).map_err(|e| {
                    BufError::io(format!("creating {}", file_parent.display()), e)
                })?;
            }
            fs::write(&file_path, content)
                .map_err(|e| BufError::io(format!("writing {}", file_path.display()), e))?;
        }

        let manifest = EntryManifest {
            name: key.full_name().clone(),
            commit: key.dashless_commit_id(),
            digest: key.digest()?,
            deps: value
                .dep_keys()
                .iter()
                .map(DepRecord::from_key)
                .collect::<BufResult<Vec<_>>>()?,
            files: value.files().keys().cloned().collect(),
        };
        let manifest_path = staging.path().join(MANIFEST_FILE);
        let mut file = fs::File::create(&manifest_path)
            .map_err(|e| BufError::io(format!("creating {}", manifest_path.display()), e))?;
        file.write_all(&serde_json::to_vec_pretty(&manifest)?)
            .and_then(|_| file.sync_all())
            .map_err(|e| BufError::io(format!("writing {}", manifest_path.display()), e))?;

        if dest.exists() {
            fs::remove_dir_all(&dest)
                .map_err(|e| BufError::io(format!("replacing {}", dest.display()), e))?;
        }
        fs::rename(staging.path(), &dest).map_err(|e| {
            BufError::io(
                format!("moving {} into place at {}", staging.path().display(), dest.display()),
                e,
            )
        })?;

        debug!("Stored {} in {} cache", key, self.label);
        Ok(())
    }

    fn delete(&self, key: &ModuleKey) -> BufResult<()> {
        let dir = self.entry_dir(key);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("Deleted {} from {} cache", key, self.label);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BufError::io(format!("removing {}", dir.display()), e)),
        }
    }

    fn label(&self) -> &'static str {
        self.label
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CommitRecord {
    name: ModuleFullName,
    commit: String,
    digest: Digest,
    create_time: DateTime<Utc>,
}

/// Store of commit metadata, one JSON file per commit
#[derive(Debug, Clone)]
pub struct CommitStore {
    root: PathBuf,
}

impl CommitStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, key: &ModuleKey) -> PathBuf {
        let mut path = self.root.join(key.cache_path());
        path.set_extension("json");
        path
    }
}

impl Bucket<Commit> for CommitStore {
    fn read(&self, key: &ModuleKey) -> BufResult<Option<Commit>> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BufError::io(format!("reading {}", path.display()), e)),
        };
        let record: CommitRecord =
            serde_json::from_slice(&bytes).map_err(|e| BufError::CacheCorrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        let commit_id = parse_commit_id(&record.commit).map_err(|e| BufError::CacheCorrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        if record.name != *key.full_name() || commit_id != key.commit_id() {
            return Err(BufError::CacheCorrupt {
                path,
                reason: format!("entry is for {}:{}", record.name, record.commit),
            });
        }
        Ok(Some(Commit::new(
            ModuleKey::new(record.name, commit_id, record.digest),
            record.create_time,
        )))
    }

    fn write(&self, key: &ModuleKey, value: &Commit) -> BufResult<()> {
        let dest = self.entry_path(key);
        let parent = dest
            .parent()
            .ok_or_else(|| BufError::internal(format!("no parent for {}", dest.display())))?;
        fs::create_dir_all(parent)
            .map_err(|e| BufError::io(format!("creating {}", parent.display()), e))?;

        let record = CommitRecord {
            name: key.full_name().clone(),
            commit: key.dashless_commit_id(),
            digest: value.key().digest()?,
            create_time: value.create_time(),
        };
        write_atomic(&dest, &serde_json::to_vec_pretty(&record)?)?;
        debug!("Stored commit {}", key);
        Ok(())
    }

    fn delete(&self, key: &ModuleKey) -> BufResult<()> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BufError::io(format!("removing {}", path.display()), e)),
        }
    }

    fn label(&self) -> &'static str {
        "commits"
    }
}

/// Write a file through a temporary sibling and rename it into place
pub fn write_atomic(dest: &Path, content: &[u8]) -> BufResult<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| BufError::internal(format!("no parent for {}", dest.display())))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(parent)
        .map_err(|e| BufError::io(format!("creating temp file in {}", parent.display()), e))?;
    temp.write_all(content)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| BufError::io(format!("writing temp file for {}", dest.display()), e))?;
    temp.persist(dest)
        .map_err(|e| BufError::io(format!("moving temp file to {}", dest.display()), e.error))?;
    Ok(())
}

/// Reject absolute paths and parent components in module file paths
pub(crate) fn checked_relative_path(path: &str) -> BufResult<&Path> {
    let p = Path::new(path);
    let valid = !path.is_empty()
        && p.components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !valid {
        return Err(BufError::User(format!(
            "invalid module file path {path:?}: must be relative without '..'"
        )));
    }
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::DigestType;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn module_data(content: &str) -> ModuleData {
        let files = BTreeMap::from([
            ("acme/v1/a.proto".to_string(), content.as_bytes().to_vec()),
            ("buf.yaml".to_string(), b"version: v2\n".to_vec()),
        ]);
        let digest = Digest::for_content(
            DigestType::Sha256,
            files.iter().map(|(p, c)| (p.as_str(), c.as_slice())),
            &[],
        );
        let key = ModuleKey::new(
            ModuleFullName::parse("buf.build/acme/a").unwrap(),
            Uuid::new_v4(),
            digest,
        );
        ModuleData::new(key, files, vec![])
    }

    #[test]
    fn module_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = ModuleDataStore::new(temp.path(), "modules");
        let data = module_data("syntax = \"proto3\";");
        let key = data.key().clone();

        assert!(store.read(&key).unwrap().is_none());
        store.write(&key, &data).unwrap();

        let read = store.read(&key).unwrap().unwrap();
        assert_eq!(read.files(), data.files());
        assert!(read.verify(&key).is_ok());
    }

    #[test]
    fn module_store_leaves_no_staging_dirs() {
        let temp = TempDir::new().unwrap();
        let store = ModuleDataStore::new(temp.path(), "modules");
        let data = module_data("x");
        let key = data.key().clone();
        store.write(&key, &data).unwrap();
        store.write(&key, &data).unwrap();

        let parent = temp.path().join(key.cache_path()).parent().unwrap().to_path_buf();
        let names: Vec<String> = fs::read_dir(parent)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![key.dashless_commit_id()]);
    }

    #[test]
    fn module_store_detects_missing_file() {
        let temp = TempDir::new().unwrap();
        let store = ModuleDataStore::new(temp.path(), "modules");
        let data = module_data("x");
        let key = data.key().clone();
        store.write(&key, &data).unwrap();

        let file = temp
            .path()
            .join(key.cache_path())
            .join(FILES_DIR)
            .join("acme/v1/a.proto");
        fs::remove_file(file).unwrap();

        let err = store.read(&key).unwrap_err();
        assert!(matches!(err, BufError::CacheCorrupt { .. }));
    }

    #[test]
    fn module_store_delete() {
        let temp = TempDir::new().unwrap();
        let store = ModuleDataStore::new(temp.path(), "modules");
        let data = module_data("x");
        let key = data.key().clone();
        store.write(&key, &data).unwrap();

        store.delete(&key).unwrap();
        assert!(store.read(&key).unwrap().is_none());
        store.delete(&key).unwrap();
    }

    #[test]
    fn module_store_rejects_escaping_paths() {
        let temp = TempDir::new().unwrap();
        let store = ModuleDataStore::new(temp.path(), "modules");
        let data = module_data("x");
        let evil = ModuleData::new(
            data.key().clone(),
            BTreeMap::from([("../escape.proto".to_string(), b"x".to_vec())]),
            vec![],
        );
        assert!(store.write(data.key(), &evil).is_err());
    }

    #[test]
    fn commit_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = CommitStore::new(temp.path());
        let key = module_data("x").key().clone();
        let commit = Commit::new(key.clone(), Utc::now());

        store.write(&key, &commit).unwrap();
        let read = store.read(&key).unwrap().unwrap();

        assert_eq!(read.key(), &key);
        assert_eq!(read.create_time(), commit.create_time());
        assert!(read.verify(&key).is_ok());
    }

    #[test]
    fn commit_store_garbage_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let store = CommitStore::new(temp.path());
        let key = module_data("x").key().clone();
        let path = store.entry_path(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{not json").unwrap();

        assert!(matches!(
            store.read(&key).unwrap_err(),
            BufError::CacheCorrupt { .. }
        ));
    }

    #[test]
    fn write_atomic_replaces_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("file.txt");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }
}
