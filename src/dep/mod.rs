//! Lock file reconciliation
//!
//! `update` and `prune` share one pass:
//! 1. Pin each declared dependency (to the locked commit, or its declared ref)
//! 2. Resolve the transitive graph and fetch every module in it
//! 3. Follow imports from the workspace to find the modules actually used
//! 4. Keep declared-and-used modules plus everything they reach, warn about
//!    declared-but-unused ones, and fail on used modules nothing declared reaches
//! 5. Replace the lock file, re-verify it, and restore the previous content
//!    if anything fails

pub mod transaction;

pub use transaction::LockTransaction;

use crate::error::{BufError, BufResult};
use crate::graph::{
    flatten, resolve_graph, resolve_refs, validate_module_keys_contains, CommitTimes, Dag,
};
use crate::lockfile::{BufLock, FileVersion};
use crate::module::{Digest, DigestPolicy, ModuleData, ModuleFullName, ModuleKey, ModuleRef};
use crate::registry::Providers;
use crate::workspace::{analyze, UsedModules, Workspace};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Why a module is in the lock file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepOrigin {
    /// Listed in `buf.yaml` deps and imported
    Declared,
    /// Reached only through a declared dependency
    Transitive,
}

impl fmt::Display for DepOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declared => write!(f, "declared"),
            Self::Transitive => write!(f, "transitive"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LockedModule {
    pub key: ModuleKey,
    pub origin: DepOrigin,
}

/// Outcome of an update or prune
#[derive(Debug, Clone)]
pub struct DepReport {
    pub lock_path: PathBuf,
    pub version: FileVersion,
    pub entries: Vec<LockedModule>,
    /// Modules previously locked or declared that the lock no longer holds
    pub pruned: Vec<ModuleFullName>,
    /// Declared-but-unused dependencies and similar non-fatal findings
    pub warnings: Vec<String>,
    /// Whether the lock file content changed
    pub changed: bool,
}

#[derive(Debug, Clone)]
enum Mode {
    Update { only: Vec<ModuleFullName> },
    Prune,
}

pub struct DepManager {
    providers: Providers,
    policy: DigestPolicy,
}

impl DepManager {
    pub fn new(providers: Providers, policy: DigestPolicy) -> Self {
        Self { providers, policy }
    }

    /// Re-resolve declared dependencies; with `only`, every other entry stays pinned
    pub async fn update(&self, dir: &Path, only: &[ModuleFullName]) -> BufResult<DepReport> {
        self.reconcile(
            dir,
            Mode::Update {
                only: only.to_vec(),
            },
        )
        .await
    }

    /// Drop unused entries without moving any pinned commit
    pub async fn prune(&self, dir: &Path) -> BufResult<DepReport> {
        self.reconcile(dir, Mode::Prune).await
    }

    /// Dependency graph of the workspace at its locked commits
    pub async fn graph(&self, dir: &Path) -> BufResult<Dag<ModuleKey>> {
        let ws = Workspace::load(dir)?;
        let existing = BufLock::read(&BufLock::path_in(dir), &self.policy)?;
        let refs: Vec<ModuleRef> = ws
            .declared_refs()?
            .iter()
            .map(|r| pinned_ref(r, existing.as_ref(), &Mode::Prune))
            .collect();
        let digest_type = self.policy.default_type();
        let roots = resolve_refs(&*self.providers.module_keys, &refs, digest_type).await?;
        resolve_graph(&*self.providers.graph, &roots, digest_type).await
    }

    /// Create time of every module in `dag`, through the commit provider
    pub async fn commit_times(&self, dag: &Dag<ModuleKey>) -> BufResult<CommitTimes> {
        if dag.is_empty() {
            return Ok(CommitTimes::new());
        }
        let keys = dag.nodes().to_vec();
        let results = self
            .providers
            .commits
            .get_commits_for_module_keys(&keys)
            .await?;
        if results.len() != keys.len() {
            return Err(BufError::internal(format!(
                "commit provider returned {} results for {} keys",
                results.len(),
                keys.len()
            )));
        }
        let mut times = CommitTimes::with_capacity(keys.len());
        for (result, key) in results.into_iter().zip(keys) {
            let commit = result?;
            commit.verify(&key)?;
            times.insert(key, commit.create_time());
        }
        Ok(times)
    }

    async fn reconcile(&self, dir: &Path, mode: Mode) -> BufResult<DepReport> {
        let ws = Workspace::load(dir)?;
        let lock_path = BufLock::path_in(dir);
        let existing = BufLock::read(&lock_path, &self.policy)?;
        let declared = ws.declared_refs()?;

        if let Mode::Update { only } = &mode {
            for name in only {
                if !declared.iter().any(|r| r.full_name() == name) {
                    return Err(BufError::User(format!(
                        "{name} is not a dependency declared in buf.yaml"
                    )));
                }
            }
        }

        let refs: Vec<ModuleRef> = declared
            .iter()
            .map(|r| pinned_ref(r, existing.as_ref(), &mode))
            .collect();
        let digest_type = self.policy.default_type();
        let roots = resolve_refs(&*self.providers.module_keys, &refs, digest_type).await?;
        let dag = resolve_graph(&*self.providers.graph, &roots, digest_type).await?;
        self.check_pinned_digests(&dag, existing.as_ref()).await?;

        let local = ws.local_names();
        let closure: Vec<ModuleKey> = flatten(&dag)?
            .into_iter()
            .filter(|k| !local.contains(k.full_name()))
            .collect();
        let datas = self.fetch_datas(&closure).await?;
        let used = analyze(ws.files(), &datas, &local)?;

        let mut warnings = Vec::new();
        let mut kept_roots = Vec::new();
        for key in &roots {
            if used.all.contains(key.full_name()) {
                kept_roots.push(key.clone());
            } else {
                warnings.push(format!(
                    "Module {} is declared in your buf.yaml deps but is unused",
                    key.full_name()
                ));
            }
        }

        let mut live: Vec<ModuleKey> = dag
            .reachable(kept_roots.iter())
            .into_iter()
            .filter(|k| !local.contains(k.full_name()))
            .collect();
        live.sort_by(|a, b| a.full_name().cmp(b.full_name()));
        let live_names: BTreeSet<ModuleFullName> =
            live.iter().map(|k| k.full_name().clone()).collect();
        let declared_names: HashSet<&ModuleFullName> =
            roots.iter().map(|k| k.full_name()).collect();

        for name in &used.all {
            if !live_names.contains(name) {
                return Err(BufError::UndeclaredDependency {
                    name: name.to_string(),
                });
            }
        }

        let entries: Vec<LockedModule> = live
            .iter()
            .map(|key| LockedModule {
                key: key.clone(),
                origin: if declared_names.contains(key.full_name()) {
                    DepOrigin::Declared
                } else {
                    DepOrigin::Transitive
                },
            })
            .collect();

        let mut gone: BTreeSet<ModuleFullName> = declared
            .iter()
            .map(|r| r.full_name().clone())
            .collect();
        if let Some(lock) = &existing {
            gone.extend(lock.deps.iter().map(|d| d.full_name.clone()));
        }
        let pruned: Vec<ModuleFullName> = gone.difference(&live_names).cloned().collect();

        let version = match &existing {
            Some(lock) => lock.version.upgraded(),
            None if ws.config().is_v2() => FileVersion::V2,
            None => FileVersion::V1,
        };
        let new_lock = BufLock::from_keys(version, &live)?;
        let changed = existing.as_ref() != Some(&new_lock);

        if changed {
            let txn = LockTransaction::begin(&lock_path)?;
            if let Err(e) = new_lock.write(&lock_path) {
                return Err(txn.rollback(e));
            }
            if let Err(e) = self.verify_lock(&lock_path, &used).await {
                return Err(txn.rollback(e));
            }
            txn.commit();
            info!("Wrote {} with {} dependencies", lock_path.display(), live.len());
        } else {
            debug!("{} is up to date", lock_path.display());
        }

        Ok(DepReport {
            lock_path,
            version,
            entries,
            pruned,
            warnings,
            changed,
        })
    }

    /// Fail when a commit still in the graph no longer has its locked digest
    ///
    /// A commit id only points at a version; the locked digest is what pins
    /// its content. Entries locked with another digest type are re-resolved
    /// in that type before comparing.
    async fn check_pinned_digests(
        &self,
        dag: &Dag<ModuleKey>,
        existing: Option<&BufLock>,
    ) -> BufResult<()> {
        let Some(lock) = existing else {
            return Ok(());
        };
        let mut other_type = Vec::new();
        for key in dag.nodes() {
            let Some(locked) = lock.find(key.full_name()) else {
                continue;
            };
            let Some(expected) = &locked.digest else {
                continue;
            };
            if locked.commit_id != key.commit_id() {
                continue;
            }
            let actual = key.digest()?;
            if actual.digest_type() == expected.digest_type() {
                check_digest(key, expected, &actual)?;
            } else {
                other_type.push((locked.to_ref(), expected.clone()));
            }
        }
        for (module_ref, expected) in other_type {
            debug!("Checking {} in {}", module_ref, expected.digest_type());
            let keys = resolve_refs(
                &*self.providers.module_keys,
                std::slice::from_ref(&module_ref),
                expected.digest_type(),
            )
            .await?;
            for key in &keys {
                check_digest(key, &expected, &key.digest()?)?;
            }
        }
        Ok(())
    }

    /// Fetch and verify module data for every key
    async fn fetch_datas(&self, keys: &[ModuleKey]) -> BufResult<Vec<ModuleData>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let results = self
            .providers
            .module_data
            .get_module_datas_for_module_keys(keys)
            .await?;
        if results.len() != keys.len() {
            return Err(BufError::internal(format!(
                "module data provider returned {} results for {} keys",
                results.len(),
                keys.len()
            )));
        }
        results
            .into_iter()
            .zip(keys)
            .map(|(result, key)| {
                let data = result?;
                data.verify(key)?;
                Ok(data)
            })
            .collect()
    }

    /// Check the written lock covers the workspace and every entry still resolves
    async fn verify_lock(&self, path: &Path, used: &UsedModules) -> BufResult<()> {
        let lock = BufLock::read(path, &self.policy)?.ok_or_else(|| {
            BufError::internal(format!("{} missing right after writing it", path.display()))
        })?;
        let locked: BTreeSet<ModuleFullName> =
            lock.deps.iter().map(|d| d.full_name.clone()).collect();
        let unused = validate_module_keys_contains(&used.all, &locked)?;
        if !unused.is_empty() {
            debug!("{} locked module(s) reached only through other modules", unused.len());
        }
        let keys = lock
            .deps
            .iter()
            .map(|d| {
                d.to_key().ok_or_else(|| {
                    BufError::internal(format!("{} written without a digest", d.full_name))
                })
            })
            .collect::<BufResult<Vec<_>>>()?;
        self.fetch_datas(&keys).await?;
        Ok(())
    }
}

fn check_digest(key: &ModuleKey, expected: &Digest, actual: &Digest) -> BufResult<()> {
    if actual == expected {
        return Ok(());
    }
    Err(BufError::DigestMismatch {
        key: key.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

fn pinned_ref(declared: &ModuleRef, existing: Option<&BufLock>, mode: &Mode) -> ModuleRef {
    let keep_locked = match mode {
        Mode::Prune => true,
        Mode::Update { only } => !only.is_empty() && !only.contains(declared.full_name()),
    };
    match existing.and_then(|lock| lock.find(declared.full_name())) {
        Some(locked) if keep_locked => locked.to_ref(),
        _ => declared.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheCategory, CacheDirs};
    use crate::module::DigestType;
    use crate::registry::{FsRegistry, ModuleDataProvider};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        registry: FsRegistry,
        ws: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let registry = FsRegistry::new(temp.path().join("registry"));
            let ws = temp.path().join("ws");
            fs::create_dir_all(&ws).unwrap();
            Self {
                temp,
                registry,
                ws,
            }
        }

        fn push(&self, module: &str, file: &str, content: &str, deps: &[ModuleKey]) -> ModuleKey {
            let files = BTreeMap::from([(file.to_string(), content.as_bytes().to_vec())]);
            self.registry
                .push(&name(module), &files, deps, &[])
                .unwrap()
        }

        fn workspace(&self, buf_yaml: &str, files: &[(&str, &str)]) {
            fs::write(self.ws.join("buf.yaml"), buf_yaml).unwrap();
            for (path, content) in files {
                let path = self.ws.join(path);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, content).unwrap();
            }
        }

        fn manager(&self) -> DepManager {
            DepManager::new(
                Providers::remote(self.registry.clone()),
                DigestPolicy::default(),
            )
        }

        fn lock(&self) -> BufLock {
            BufLock::read(&BufLock::path_in(&self.ws), &DigestPolicy::default())
                .unwrap()
                .unwrap()
        }

        fn lock_bytes(&self) -> Vec<u8> {
            fs::read(BufLock::path_in(&self.ws)).unwrap()
        }
    }

    fn name(s: &str) -> ModuleFullName {
        ModuleFullName::parse(s).unwrap()
    }

    fn lock_names(lock: &BufLock) -> Vec<String> {
        lock.deps.iter().map(|d| d.full_name.to_string()).collect()
    }

    #[tokio::test]
    async fn prune_removes_unused_declared_dependency() {
        let fx = Fixture::new();
        let a = fx.push("buf.build/acme/a", "acme/a/a.proto", "", &[]);
        let b = fx.push("buf.build/acme/b", "acme/b/b.proto", "", &[]);
        fx.workspace(
            "version: v2\ndeps:\n  - buf.build/acme/a\n  - buf.build/acme/b\n",
            &[("weather.proto", "import \"acme/a/a.proto\";")],
        );
        BufLock::from_keys(FileVersion::V2, &[a.clone(), b])
            .unwrap()
            .write(&BufLock::path_in(&fx.ws))
            .unwrap();

        let report = fx.manager().prune(&fx.ws).await.unwrap();

        assert!(report.changed);
        assert_eq!(report.pruned, vec![name("buf.build/acme/b")]);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("buf.build/acme/b"));
        let lock = fx.lock();
        assert_eq!(lock_names(&lock), vec!["buf.build/acme/a"]);
        assert_eq!(lock.deps[0].to_key().unwrap(), a);
        assert_eq!(lock.deps[0].digest.as_ref(), Some(&a.digest().unwrap()));
    }

    #[tokio::test]
    async fn update_keeps_transitive_dependency() {
        let fx = Fixture::new();
        let c = fx.push("buf.build/acme/c", "acme/c/c.proto", "", &[]);
        let a = fx.push(
            "buf.build/acme/a",
            "acme/a/a.proto",
            "import \"acme/c/c.proto\";",
            &[c.clone()],
        );
        fx.workspace(
            "version: v2\ndeps:\n  - buf.build/acme/a\n",
            &[(
                "weather.proto",
                "import \"acme/a/a.proto\";\nimport \"acme/c/c.proto\";",
            )],
        );

        let report = fx.manager().update(&fx.ws, &[]).await.unwrap();

        let origins: Vec<(String, DepOrigin)> = report
            .entries
            .iter()
            .map(|e| (e.key.full_name().to_string(), e.origin))
            .collect();
        assert_eq!(
            origins,
            vec![
                ("buf.build/acme/a".to_string(), DepOrigin::Declared),
                ("buf.build/acme/c".to_string(), DepOrigin::Transitive),
            ]
        );
        assert!(report.warnings.is_empty());
        assert_eq!(report.version, FileVersion::V2);
        let lock = fx.lock();
        assert_eq!(lock.deps[0].to_key().unwrap(), a);
        assert_eq!(lock.deps[1].to_key().unwrap(), c);
    }

    #[tokio::test]
    async fn prune_is_idempotent() {
        let fx = Fixture::new();
        fx.push("buf.build/acme/a", "acme/a/a.proto", "", &[]);
        fx.push("buf.build/acme/b", "acme/b/b.proto", "", &[]);
        fx.workspace(
            "version: v1\ndeps:\n  - buf.build/acme/a\n  - buf.build/acme/b\n",
            &[("weather.proto", "import \"acme/a/a.proto\";")],
        );
        let manager = fx.manager();

        manager.update(&fx.ws, &[]).await.unwrap();
        manager.prune(&fx.ws).await.unwrap();
        let first = fx.lock_bytes();
        let second_report = manager.prune(&fx.ws).await.unwrap();

        assert!(!second_report.changed);
        assert_eq!(fx.lock_bytes(), first);
        assert_eq!(fx.lock().version, FileVersion::V1);
    }

    fn tamper(fx: &Fixture, key: &ModuleKey, file: &str, content: &str) {
        let path = fx
            .registry
            .root()
            .join("buf.build/acme")
            .join(key.full_name().name())
            .join("commits")
            .join(key.dashless_commit_id())
            .join("files")
            .join(file);
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn prune_rejects_content_changed_under_locked_commit() {
        let fx = Fixture::new();
        let a = fx.push("buf.build/acme/a", "acme/a/a.proto", "// v1", &[]);
        fx.workspace(
            "version: v2\ndeps:\n  - buf.build/acme/a\n",
            &[("weather.proto", "import \"acme/a/a.proto\";")],
        );
        let manager = fx.manager();
        manager.update(&fx.ws, &[]).await.unwrap();
        let before = fx.lock_bytes();
        tamper(&fx, &a, "acme/a/a.proto", "// rewritten");

        let err = manager.prune(&fx.ws).await.unwrap_err();

        match err {
            BufError::DigestMismatch { key, expected, .. } => {
                assert!(key.starts_with("buf.build/acme/a:"));
                assert_eq!(expected, a.digest().unwrap().to_string());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.lock_bytes(), before);
    }

    #[tokio::test]
    async fn update_only_checks_pins_it_keeps() {
        let fx = Fixture::new();
        fx.push("buf.build/acme/a", "acme/a/a.proto", "// 1", &[]);
        let b = fx.push("buf.build/acme/b", "acme/b/b.proto", "// 1", &[]);
        fx.workspace(
            "version: v2\ndeps:\n  - buf.build/acme/a\n  - buf.build/acme/b\n",
            &[(
                "weather.proto",
                "import \"acme/a/a.proto\";\nimport \"acme/b/b.proto\";",
            )],
        );
        let manager = fx.manager();
        manager.update(&fx.ws, &[]).await.unwrap();
        tamper(&fx, &b, "acme/b/b.proto", "// swapped");

        let err = manager
            .update(&fx.ws, &[name("buf.build/acme/a")])
            .await
            .unwrap_err();

        assert!(matches!(err, BufError::DigestMismatch { .. }));
    }

    #[tokio::test]
    async fn pins_of_another_digest_type_are_checked_in_that_type() {
        let fx = Fixture::new();
        let a = fx.push("buf.build/acme/a", "acme/a/a.proto", "// v1", &[]);
        fx.workspace(
            "version: v2\ndeps:\n  - buf.build/acme/a\n",
            &[("weather.proto", "import \"acme/a/a.proto\";")],
        );
        let sha512 = DigestPolicy::new(DigestType::Sha512, vec![]);
        DepManager::new(Providers::remote(fx.registry.clone()), sha512)
            .update(&fx.ws, &[])
            .await
            .unwrap();

        // A sha256 pass accepts the untouched sha512 pin
        fx.manager().prune(&fx.ws).await.unwrap();
        assert_eq!(fx.lock().deps[0].commit_id, a.commit_id());

        tamper(&fx, &a, "acme/a/a.proto", "// rewritten");
        let err = DepManager::new(
            Providers::remote(fx.registry.clone()),
            DigestPolicy::new(DigestType::Sha512, vec![]),
        )
        .update(&fx.ws, &[])
        .await
        .unwrap_err();
        assert!(matches!(err, BufError::DigestMismatch { .. }));
    }

    #[tokio::test]
    async fn prune_keeps_locked_commits() {
        let fx = Fixture::new();
        let old = fx.push("buf.build/acme/a", "acme/a/a.proto", "// v1", &[]);
        fx.workspace(
            "version: v2\ndeps:\n  - buf.build/acme/a\n",
            &[("weather.proto", "import \"acme/a/a.proto\";")],
        );
        let manager = fx.manager();
        manager.update(&fx.ws, &[]).await.unwrap();
        fx.push("buf.build/acme/a", "acme/a/a.proto", "// v2", &[]);

        manager.prune(&fx.ws).await.unwrap();
        assert_eq!(fx.lock().deps[0].commit_id, old.commit_id());

        manager.update(&fx.ws, &[]).await.unwrap();
        assert_ne!(fx.lock().deps[0].commit_id, old.commit_id());
    }

    #[tokio::test]
    async fn update_only_moves_named_modules() {
        let fx = Fixture::new();
        let a1 = fx.push("buf.build/acme/a", "acme/a/a.proto", "// 1", &[]);
        let b1 = fx.push("buf.build/acme/b", "acme/b/b.proto", "// 1", &[]);
        fx.workspace(
            "version: v2\ndeps:\n  - buf.build/acme/a\n  - buf.build/acme/b\n",
            &[(
                "weather.proto",
                "import \"acme/a/a.proto\";\nimport \"acme/b/b.proto\";",
            )],
        );
        let manager = fx.manager();
        manager.update(&fx.ws, &[]).await.unwrap();
        let a2 = fx.push("buf.build/acme/a", "acme/a/a.proto", "// 2", &[]);
        fx.push("buf.build/acme/b", "acme/b/b.proto", "// 2", &[]);

        manager
            .update(&fx.ws, &[name("buf.build/acme/a")])
            .await
            .unwrap();

        let lock = fx.lock();
        assert_eq!(lock.deps[0].commit_id, a2.commit_id());
        assert_ne!(lock.deps[0].commit_id, a1.commit_id());
        assert_eq!(lock.deps[1].commit_id, b1.commit_id());

        let err = manager
            .update(&fx.ws, &[name("buf.build/acme/zzz")])
            .await
            .unwrap_err();
        assert!(matches!(err, BufError::User(_)));
    }

    #[tokio::test]
    async fn used_module_reachable_only_through_unused_dep_is_an_error() {
        let fx = Fixture::new();
        let c = fx.push("buf.build/acme/c", "acme/c/c.proto", "", &[]);
        fx.push("buf.build/acme/a", "acme/a/a.proto", "", &[]);
        fx.push("buf.build/acme/b", "acme/b/b.proto", "", &[c]);
        fx.workspace(
            "version: v2\ndeps:\n  - buf.build/acme/a\n  - buf.build/acme/b\n",
            &[(
                "weather.proto",
                "import \"acme/a/a.proto\";\nimport \"acme/c/c.proto\";",
            )],
        );

        let err = fx.manager().update(&fx.ws, &[]).await.unwrap_err();

        match err {
            BufError::UndeclaredDependency { name } => assert_eq!(name, "buf.build/acme/c"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!BufLock::path_in(&fx.ws).exists());
    }

    #[tokio::test]
    async fn local_modules_are_never_locked() {
        let fx = Fixture::new();
        fx.push("buf.build/acme/a", "acme/a/a.proto", "", &[]);
        fx.workspace(
            "version: v2\n\
             modules:\n  - path: local\n    name: buf.build/acme/local\n  - path: app\n\
             deps:\n  - buf.build/acme/local\n  - buf.build/acme/a\n",
            &[
                ("local/local.proto", "import \"acme/a/a.proto\";"),
                ("app/app.proto", "import \"local.proto\";"),
            ],
        );

        let report = fx.manager().update(&fx.ws, &[]).await.unwrap();

        assert_eq!(lock_names(&fx.lock()), vec!["buf.build/acme/a"]);
        assert!(report.warnings.is_empty());
    }

    struct FailAfterFirstCall {
        inner: FsRegistry,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModuleDataProvider for FailAfterFirstCall {
        async fn get_module_datas_for_module_keys(
            &self,
            keys: &[ModuleKey],
        ) -> BufResult<Vec<BufResult<ModuleData>>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(BufError::Remote {
                    operation: "fetch module data",
                    subject: format!("{} module(s)", keys.len()),
                    reason: "connection reset".to_string(),
                });
            }
            self.inner.get_module_datas_for_module_keys(keys).await
        }
    }

    #[tokio::test]
    async fn failed_verification_restores_previous_lock() {
        let fx = Fixture::new();
        fx.push("buf.build/acme/a", "acme/a/a.proto", "// 1", &[]);
        fx.workspace(
            "version: v2\ndeps:\n  - buf.build/acme/a\n",
            &[("weather.proto", "import \"acme/a/a.proto\";")],
        );
        fx.manager().update(&fx.ws, &[]).await.unwrap();
        let before = fx.lock_bytes();
        fx.push("buf.build/acme/a", "acme/a/a.proto", "// 2", &[]);

        let mut providers = Providers::remote(fx.registry.clone());
        providers.module_data = Arc::new(FailAfterFirstCall {
            inner: fx.registry.clone(),
            calls: AtomicUsize::new(0),
        });
        let manager = DepManager::new(providers, DigestPolicy::default());

        let err = manager.update(&fx.ws, &[]).await.unwrap_err();

        assert!(matches!(err, BufError::LockUpdateRolledBack { .. }));
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(fx.lock_bytes(), before);
    }

    #[tokio::test]
    async fn sha512_policy_pins_sha512_digests() {
        let fx = Fixture::new();
        fx.push("buf.build/acme/a", "acme/a/a.proto", "", &[]);
        fx.workspace(
            "version: v2\ndeps:\n  - buf.build/acme/a\n",
            &[("weather.proto", "import \"acme/a/a.proto\";")],
        );
        let manager = DepManager::new(
            Providers::remote(fx.registry.clone()),
            DigestPolicy::new(DigestType::Sha512, vec![]),
        );

        manager.update(&fx.ws, &[]).await.unwrap();

        let digest = fx.lock().deps[0].digest.clone().unwrap();
        assert_eq!(digest.digest_type(), DigestType::Sha512);
    }

    #[tokio::test]
    async fn graph_resolves_locked_commits() {
        let fx = Fixture::new();
        let c = fx.push("buf.build/acme/c", "acme/c/c.proto", "", &[]);
        let a = fx.push("buf.build/acme/a", "acme/a/a.proto", "", &[c.clone()]);
        fx.workspace("version: v2\ndeps:\n  - buf.build/acme/a\n", &[]);

        let dag = fx.manager().graph(&fx.ws).await.unwrap();

        assert_eq!(dag.outbound(&a), vec![&c]);
    }

    #[tokio::test]
    async fn commit_times_go_through_the_commit_cache() {
        let fx = Fixture::new();
        let c = fx.push("buf.build/acme/c", "acme/c/c.proto", "", &[]);
        fx.push("buf.build/acme/a", "acme/a/a.proto", "", &[c]);
        fx.workspace("version: v2\ndeps:\n  - buf.build/acme/a\n", &[]);
        let dirs = CacheDirs::new(fx.temp.path().join("cache"));
        let manager = DepManager::new(
            Providers::cached(fx.registry.clone(), &dirs).unwrap(),
            DigestPolicy::default(),
        );

        let dag = manager.graph(&fx.ws).await.unwrap();
        let times = manager.commit_times(&dag).await.unwrap();

        assert_eq!(times.len(), 2);
        let cached = fs::read_dir(dirs.path(CacheCategory::V3Commits).join("buf.build/acme"))
            .unwrap()
            .count();
        assert_eq!(cached, 2);
    }
}
