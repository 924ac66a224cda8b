//! Caching decorators for module data and commit providers
//!
//! A lookup first consults the on-disk bucket under a shared lock. Entries
//! that fail verification are deleted under an exclusive lock and treated as
//! misses. All misses go to the wrapped provider in one batch; each fetched
//! value is verified against the requested key before it is written.

use crate::cache::filelock::FileLocker;
use crate::cache::store::{Bucket, CommitStore, ModuleDataStore};
use crate::error::{BufError, BufResult};
use crate::module::{Commit, ModuleData, ModuleKey};
use crate::registry::{CommitProvider, ModuleDataProvider};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// A value that can be checked against the key it was requested for
pub trait Cacheable: Clone + Send + Sync + 'static {
    fn verify(&self, expected: &ModuleKey) -> BufResult<()>;
}

impl Cacheable for ModuleData {
    fn verify(&self, expected: &ModuleKey) -> BufResult<()> {
        ModuleData::verify(self, expected)
    }
}

impl Cacheable for Commit {
    fn verify(&self, expected: &ModuleKey) -> BufResult<()> {
        Commit::verify(self, expected)
    }
}

enum Lookup<T> {
    Hit(T),
    Miss,
    Invalid(String),
}

/// Bucket plus the locks that guard it
pub struct CachingStore<T> {
    bucket: Arc<dyn Bucket<T>>,
    locker: Arc<FileLocker>,
}

impl<T> Clone for CachingStore<T> {
    fn clone(&self) -> Self {
        Self {
            bucket: Arc::clone(&self.bucket),
            locker: Arc::clone(&self.locker),
        }
    }
}

fn is_corruption(err: &BufError) -> bool {
    matches!(
        err,
        BufError::CacheCorrupt { .. } | BufError::DigestMismatch { .. }
    )
}

impl<T: Cacheable> CachingStore<T> {
    pub fn new(bucket: Arc<dyn Bucket<T>>, locker: Arc<FileLocker>) -> Self {
        Self { bucket, locker }
    }

    fn lock_name(&self, key: &ModuleKey) -> PathBuf {
        PathBuf::from(self.bucket.label()).join(key.cache_path())
    }

    fn check(&self, key: &ModuleKey) -> BufResult<Lookup<T>> {
        match self.bucket.read(key) {
            Ok(Some(value)) => match value.verify(key) {
                Ok(()) => Ok(Lookup::Hit(value)),
                Err(e) if is_corruption(&e) => Ok(Lookup::Invalid(e.to_string())),
                Err(e) => Err(e),
            },
            Ok(None) => Ok(Lookup::Miss),
            Err(e) if is_corruption(&e) => Ok(Lookup::Invalid(e.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Read and verify one entry, discarding it if invalid
    pub fn read_blocking(&self, key: &ModuleKey) -> BufResult<Option<T>> {
        let name = self.lock_name(key);
        match self.locker.with_rlock(&name, || self.check(key))? {
            Lookup::Hit(value) => Ok(Some(value)),
            Lookup::Miss => Ok(None),
            Lookup::Invalid(reason) => {
                warn!("Discarding invalid {} cache entry {}: {}", self.bucket.label(), key, reason);
                self.locker.with_lock(&name, || match self.check(key)? {
                    // Another process replaced it while we waited for the lock
                    Lookup::Hit(value) => Ok(Some(value)),
                    Lookup::Miss => Ok(None),
                    Lookup::Invalid(_) => {
                        self.bucket.delete(key)?;
                        Ok(None)
                    }
                })
            }
        }
    }

    /// Verify a fetched value and store it unless a valid entry already exists
    pub fn write_blocking(&self, key: &ModuleKey, value: T) -> BufResult<T> {
        value.verify(key)?;
        let name = self.lock_name(key);
        self.locker.with_lock(&name, || {
            if let Ok(Lookup::Hit(existing)) = self.check(key) {
                debug!("{} cache entry {} already written", self.bucket.label(), key);
                return Ok(existing);
            }
            self.bucket.write(key, &value)?;
            Ok(value)
        })
    }

    /// Return a value per key, fetching every miss in one call to `fetch`
    pub async fn get_or_fetch<F, Fut>(
        &self,
        keys: &[ModuleKey],
        fetch: F,
    ) -> BufResult<Vec<BufResult<T>>>
    where
        F: FnOnce(Vec<ModuleKey>) -> Fut + Send,
        Fut: Future<Output = BufResult<Vec<BufResult<T>>>> + Send,
    {
        let lookups = join_all(keys.iter().cloned().map(|key| {
            let store = self.clone();
            async move {
                tokio::task::spawn_blocking(move || store.read_blocking(&key))
                    .await
                    .map_err(|e| BufError::internal(format!("cache read task failed: {e}")))?
            }
        }))
        .await;

        let mut results: Vec<Option<BufResult<T>>> = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for (key, lookup) in keys.iter().zip(lookups) {
            match lookup {
                Ok(Some(value)) => results.push(Some(Ok(value))),
                Ok(None) => {
                    missing.push((results.len(), key.clone()));
                    results.push(None);
                }
                Err(e) => results.push(Some(Err(e))),
            }
        }
        debug!(
            "{} cache: {} hit(s), {} miss(es)",
            self.bucket.label(),
            keys.len() - missing.len(),
            missing.len()
        );

        if !missing.is_empty() {
            let missing_keys: Vec<ModuleKey> = missing.iter().map(|(_, k)| k.clone()).collect();
            let fetched = fetch(missing_keys).await?;
            if fetched.len() != missing.len() {
                return Err(BufError::internal(format!(
                    "provider returned {} results for {} keys",
                    fetched.len(),
                    missing.len()
                )));
            }

            let writes = join_all(missing.iter().cloned().zip(fetched).map(
                |((idx, key), fetched)| {
                    let store = self.clone();
                    async move {
                        let value = fetched?;
                        let written = tokio::task::spawn_blocking(move || {
                            store.write_blocking(&key, value)
                        })
                        .await
                        .map_err(|e| BufError::internal(format!("cache write task failed: {e}")))?;
                        written.map(|v| (idx, v))
                    }
                },
            ))
            .await;

            for ((idx, _), written) in missing.iter().zip(writes) {
                results[*idx] = Some(written.map(|(_, v)| v));
            }
        }

        results
            .into_iter()
            .zip(keys)
            .map(|(slot, key)| {
                slot.ok_or_else(|| BufError::internal(format!("no cache result for {key}")))
            })
            .collect()
    }
}

/// Module data provider backed by a content-addressed cache
pub struct CachedModuleDataProvider {
    store: CachingStore<ModuleData>,
    delegate: Arc<dyn ModuleDataProvider>,
}

impl CachedModuleDataProvider {
    pub fn new(
        delegate: Arc<dyn ModuleDataProvider>,
        store: ModuleDataStore,
        locker: Arc<FileLocker>,
    ) -> Self {
        Self {
            store: CachingStore::new(Arc::new(store), locker),
            delegate,
        }
    }
}

#[async_trait]
impl ModuleDataProvider for CachedModuleDataProvider {
    async fn get_module_datas_for_module_keys(
        &self,
        keys: &[ModuleKey],
    ) -> BufResult<Vec<BufResult<ModuleData>>> {
        let delegate = Arc::clone(&self.delegate);
        self.store
            .get_or_fetch(keys, move |missing| async move {
                delegate.get_module_datas_for_module_keys(&missing).await
            })
            .await
    }
}

/// Commit provider backed by a commit metadata cache
pub struct CachedCommitProvider {
    store: CachingStore<Commit>,
    delegate: Arc<dyn CommitProvider>,
}

impl CachedCommitProvider {
    pub fn new(
        delegate: Arc<dyn CommitProvider>,
        store: CommitStore,
        locker: Arc<FileLocker>,
    ) -> Self {
        Self {
            store: CachingStore::new(Arc::new(store), locker),
            delegate,
        }
    }
}

#[async_trait]
impl CommitProvider for CachedCommitProvider {
    async fn get_commits_for_module_keys(
        &self,
        keys: &[ModuleKey],
    ) -> BufResult<Vec<BufResult<Commit>>> {
        let delegate = Arc::clone(&self.delegate);
        self.store
            .get_or_fetch(keys, move |missing| async move {
                delegate.get_commits_for_module_keys(&missing).await
            })
            .await
    }
}
