//! Directory-backed registry
//!
//! Serves modules from a local directory tree, standing in for a remote
//! registry when `registry.mirror` is set and in tests.
//!
//! ```text
//! <root>/<registry>/<owner>/<name>/
//!   commits/<commit>/commit.json   name, commit, create time, deps, file list
//!   commits/<commit>/files/...     module files
//!   labels/<label>                 commit ID the label points at
//! ```
//!
//! Digests are not stored: keys handed out compute them on first access
//! from the files and the dependency digests of the same type.

use crate::cache::store::{checked_relative_path, write_atomic};
use crate::error::{BufError, BufResult};
use crate::graph::Dag;
use crate::module::{
    parse_commit_id, Commit, Digest, DigestType, ModuleData, ModuleFullName, ModuleKey, ModuleRef,
};
use crate::registry::{CommitProvider, GraphProvider, ModuleDataProvider, ModuleKeyProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Label every push moves
pub const DEFAULT_LABEL: &str = "main";

const COMMIT_FILE: &str = "commit.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommitRecord {
    name: ModuleFullName,
    commit: String,
    create_time: DateTime<Utc>,
    deps: Vec<DepRecord>,
    files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DepRecord {
    name: ModuleFullName,
    commit: String,
}

#[derive(Debug, Clone)]
pub struct FsRegistry {
    root: PathBuf,
}

impl FsRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn module_dir(&self, name: &ModuleFullName) -> PathBuf {
        self.root
            .join(name.registry())
            .join(name.owner())
            .join(name.name())
    }

    fn commit_dir(&self, name: &ModuleFullName, commit: Uuid) -> PathBuf {
        self.module_dir(name)
            .join("commits")
            .join(commit.simple().to_string())
    }

    fn label_path(&self, name: &ModuleFullName, label: &str) -> PathBuf {
        self.module_dir(name).join("labels").join(label)
    }

    /// Publish a new commit of a module and move its labels to it
    ///
    /// `deps` are the direct dependencies, which must already exist in this
    /// registry. `DEFAULT_LABEL` is always moved in addition to `labels`.
    pub fn push(
        &self,
        name: &ModuleFullName,
        files: &BTreeMap<String, Vec<u8>>,
        deps: &[ModuleKey],
        labels: &[&str],
    ) -> BufResult<ModuleKey> {
        for dep in deps {
            self.read_record(dep.full_name(), dep.commit_id())?;
        }

        let commit = Uuid::new_v4();
        let dir = self.commit_dir(name, commit);
        let files_dir = dir.join("files");
        for (path, content) in files {
            let file_path = files_dir.join(checked_relative_path(path)?);
            if let Some(parent) = file_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| BufError::io(format!("creating {}", parent.display()), e))?;
            }
            fs::write(&file_path, content)
                .map_err(|e| BufError::io(format!("writing {}", file_path.display()), e))?;
        }

        let record = CommitRecord {
            name: name.clone(),
            commit: commit.simple().to_string(),
            create_time: Utc::now(),
            deps: deps
                .iter()
                .map(|d| DepRecord {
                    name: d.full_name().clone(),
                    commit: d.dashless_commit_id(),
                })
                .collect(),
            files: files.keys().cloned().collect(),
        };
        write_atomic(&dir.join(COMMIT_FILE), &serde_json::to_vec_pretty(&record)?)?;

        let mut all_labels = vec![DEFAULT_LABEL];
        all_labels.extend(labels.iter().copied().filter(|l| *l != DEFAULT_LABEL));
        for label in all_labels {
            let path = self.label_path(name, label);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| BufError::io(format!("creating {}", parent.display()), e))?;
            }
            write_atomic(&path, record.commit.as_bytes())?;
        }

        info!("Pushed {}:{}", name, record.commit);
        Ok(self.key(name.clone(), commit, DigestType::Sha256))
    }

    fn read_record(&self, name: &ModuleFullName, commit: Uuid) -> BufResult<CommitRecord> {
        let path = self.commit_dir(name, commit).join(COMMIT_FILE);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                BufError::ModuleNotFound(format!("{}:{}", name, commit.simple()))
            }
            _ => BufError::io(format!("reading {}", path.display()), e),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| BufError::Remote {
            operation: "read commit",
            subject: format!("{}:{}", name, commit.simple()),
            reason: e.to_string(),
        })
    }

    fn read_files(
        &self,
        name: &ModuleFullName,
        commit: Uuid,
        record: &CommitRecord,
    ) -> BufResult<BTreeMap<String, Vec<u8>>> {
        let files_dir = self.commit_dir(name, commit).join("files");
        record
            .files
            .iter()
            .map(|path| {
                let file_path = files_dir.join(checked_relative_path(path)?);
                let content = fs::read(&file_path)
                    .map_err(|e| BufError::io(format!("reading {}", file_path.display()), e))?;
                Ok((path.clone(), content))
            })
            .collect()
    }

    fn dep_ids(record: &CommitRecord) -> BufResult<Vec<(ModuleFullName, Uuid)>> {
        record
            .deps
            .iter()
            .map(|d| Ok((d.name.clone(), parse_commit_id(&d.commit)?)))
            .collect()
    }

    /// A key whose digest of `digest_type` is computed on first access
    pub fn key(&self, name: ModuleFullName, commit: Uuid, digest_type: DigestType) -> ModuleKey {
        let registry = self.clone();
        let lookup_name = name.clone();
        ModuleKey::new_lazy(name, commit, move || {
            registry.compute_digest(&lookup_name, commit, digest_type)
        })
    }

    /// Compute a commit's digest, recursing through its dependencies
    pub fn compute_digest(
        &self,
        name: &ModuleFullName,
        commit: Uuid,
        digest_type: DigestType,
    ) -> BufResult<Digest> {
        let mut memo = HashMap::new();
        self.compute_digest_memo(name, commit, digest_type, &mut memo, &mut Vec::new())
    }

    fn compute_digest_memo(
        &self,
        name: &ModuleFullName,
        commit: Uuid,
        digest_type: DigestType,
        memo: &mut HashMap<(ModuleFullName, Uuid), Digest>,
        path: &mut Vec<String>,
    ) -> BufResult<Digest> {
        let id = (name.clone(), commit);
        if let Some(digest) = memo.get(&id) {
            return Ok(digest.clone());
        }
        let label = format!("{}:{}", name, commit.simple());
        if path.contains(&label) {
            path.push(label);
            return Err(BufError::GraphCycle {
                cycle: path.join(" -> "),
            });
        }
        path.push(label);

        let record = self.read_record(name, commit)?;
        let files = self.read_files(name, commit, &record)?;
        let mut dep_digests = Vec::with_capacity(record.deps.len());
        for (dep_name, dep_commit) in Self::dep_ids(&record)? {
            dep_digests.push(self.compute_digest_memo(
                &dep_name,
                dep_commit,
                digest_type,
                memo,
                path,
            )?);
        }
        path.pop();

        let digest = Digest::for_content(
            digest_type,
            files.iter().map(|(p, c)| (p.as_str(), c.as_slice())),
            &dep_digests,
        );
        memo.insert(id, digest.clone());
        Ok(digest)
    }

    fn resolve_ref(&self, module_ref: &ModuleRef) -> BufResult<Uuid> {
        let name = module_ref.full_name();
        let reference = module_ref.reference().unwrap_or(DEFAULT_LABEL);

        if let Ok(commit) = parse_commit_id(reference) {
            if self.commit_dir(name, commit).join(COMMIT_FILE).is_file() {
                return Ok(commit);
            }
        }

        let label_path = self.label_path(name, reference);
        match fs::read_to_string(&label_path) {
            Ok(content) => parse_commit_id(content.trim()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(BufError::ModuleNotFound(module_ref.to_string()))
            }
            Err(e) => Err(BufError::io(format!("reading {}", label_path.display()), e)),
        }
    }

    fn module_data(&self, key: &ModuleKey) -> BufResult<ModuleData> {
        let record = self.read_record(key.full_name(), key.commit_id())?;
        let digest_type = key.digest()?.digest_type();
        let files = self.read_files(key.full_name(), key.commit_id(), &record)?;
        let dep_keys = Self::dep_ids(&record)?
            .into_iter()
            .map(|(name, commit)| self.key(name, commit, digest_type))
            .collect();
        Ok(ModuleData::new(key.clone(), files, dep_keys))
    }

    fn commit(&self, key: &ModuleKey) -> BufResult<Commit> {
        let record = self.read_record(key.full_name(), key.commit_id())?;
        let digest_type = key.digest()?.digest_type();
        let digest = self.compute_digest(key.full_name(), key.commit_id(), digest_type)?;
        Ok(Commit::new(
            ModuleKey::new(key.full_name().clone(), key.commit_id(), digest),
            record.create_time,
        ))
    }

    fn graph(&self, keys: &[ModuleKey], digest_type: DigestType) -> BufResult<Dag<ModuleKey>> {
        let mut dag = Dag::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        for key in keys {
            let root = self.key(key.full_name().clone(), key.commit_id(), digest_type);
            dag.add_node(root.clone());
            if seen.insert(root.clone()) {
                queue.push_back(root);
            }
        }
        while let Some(key) = queue.pop_front() {
            let record = self.read_record(key.full_name(), key.commit_id())?;
            for (name, commit) in Self::dep_ids(&record)? {
                let dep = self.key(name, commit, digest_type);
                dag.add_edge(key.clone(), dep.clone());
                if seen.insert(dep.clone()) {
                    queue.push_back(dep);
                }
            }
        }
        debug!("Built graph of {} module(s) from {} root(s)", dag.len(), keys.len());
        Ok(dag)
    }
}

async fn blocking<T, F>(registry: &FsRegistry, f: F) -> BufResult<T>
where
    T: Send + 'static,
    F: FnOnce(FsRegistry) -> BufResult<T> + Send + 'static,
{
    let registry = registry.clone();
    tokio::task::spawn_blocking(move || f(registry))
        .await
        .map_err(|e| BufError::internal(format!("registry task failed: {e}")))?
}

#[async_trait]
impl ModuleKeyProvider for FsRegistry {
    async fn get_module_keys_for_module_refs(
        &self,
        refs: &[ModuleRef],
        digest_type: DigestType,
    ) -> BufResult<Vec<BufResult<ModuleKey>>> {
        let refs = refs.to_vec();
        blocking(self, move |registry| {
            Ok(refs
                .iter()
                .map(|r| {
                    let commit = registry.resolve_ref(r)?;
                    Ok(registry.key(r.full_name().clone(), commit, digest_type))
                })
                .collect())
        })
        .await
    }
}

#[async_trait]
impl ModuleDataProvider for FsRegistry {
    async fn get_module_datas_for_module_keys(
        &self,
        keys: &[ModuleKey],
    ) -> BufResult<Vec<BufResult<ModuleData>>> {
        let keys = keys.to_vec();
        blocking(self, move |registry| {
            Ok(keys.iter().map(|k| registry.module_data(k)).collect())
        })
        .await
    }
}

#[async_trait]
impl CommitProvider for FsRegistry {
    async fn get_commits_for_module_keys(
        &self,
        keys: &[ModuleKey],
    ) -> BufResult<Vec<BufResult<Commit>>> {
        let keys = keys.to_vec();
        blocking(self, move |registry| {
            Ok(keys
                .iter()
                .map(|k| {
                    registry.commit(k).map_err(|e| match e {
                        BufError::ModuleNotFound(s) => BufError::CommitNotFound(s),
                        other => other,
                    })
                })
                .collect())
        })
        .await
    }
}

#[async_trait]
impl GraphProvider for FsRegistry {
    async fn get_graph_for_module_keys(
        &self,
        keys: &[ModuleKey],
        digest_type: DigestType,
    ) -> BufResult<Dag<ModuleKey>> {
        let keys = keys.to_vec();
        blocking(self, move |registry| registry.graph(&keys, digest_type)).await
    }
}
