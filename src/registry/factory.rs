//! Provider factory
//!
//! Builds the provider chain named by the configuration once at startup.

use crate::cache::{
    CacheCategory, CacheDirs, CachedCommitProvider, CachedModuleDataProvider, CommitStore,
    FileLocker, ModuleDataStore,
};
use crate::config::{Config, REGISTRY_MIRROR_ENV};
use crate::error::{BufError, BufResult};
use crate::registry::fs::FsRegistry;
use crate::registry::{
    CommitProvider, GraphProvider, ModuleDataProvider, ModuleKeyProvider, NopProvider,
    WellKnownTypesRouter,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Which provider chain to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Knows no modules
    Nop,
    /// Talks to the registry on every call
    Remote,
    /// Registry behind the local module cache
    Cached,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Nop => "nop",
            Self::Remote => "remote",
            Self::Cached => "cached",
        };
        write!(f, "{s}")
    }
}

/// One provider of each kind
#[derive(Clone)]
pub struct Providers {
    pub module_keys: Arc<dyn ModuleKeyProvider>,
    pub module_data: Arc<dyn ModuleDataProvider>,
    pub commits: Arc<dyn CommitProvider>,
    pub graph: Arc<dyn GraphProvider>,
}

impl Providers {
    pub fn nop() -> Self {
        Self {
            module_keys: Arc::new(NopProvider),
            module_data: Arc::new(NopProvider),
            commits: Arc::new(NopProvider),
            graph: Arc::new(NopProvider),
        }
    }

    /// Every call goes straight to `registry`
    pub fn remote(registry: FsRegistry) -> Self {
        let registry = Arc::new(registry);
        Self {
            module_keys: registry.clone(),
            module_data: registry.clone(),
            commits: registry.clone(),
            graph: registry,
        }
    }

    /// Module data and commits go through the cache under `dirs`
    pub fn cached(registry: FsRegistry, dirs: &CacheDirs) -> BufResult<Self> {
        let modules = dirs.ensure(CacheCategory::V3Modules)?;
        let commits = dirs.ensure(CacheCategory::V3Commits)?;
        let well_known_types = dirs.ensure(CacheCategory::V3WellKnownTypes)?;
        let locks = dirs.ensure(CacheCategory::V3ModuleLocks)?;
        let locker = Arc::new(FileLocker::new(locks));

        let registry = Arc::new(registry);
        let module_data = WellKnownTypesRouter::new(
            Arc::new(CachedModuleDataProvider::new(
                registry.clone(),
                ModuleDataStore::new(modules, "modules"),
                Arc::clone(&locker),
            )),
            Arc::new(CachedModuleDataProvider::new(
                registry.clone(),
                ModuleDataStore::new(well_known_types, "wellknowntypes"),
                Arc::clone(&locker),
            )),
        );
        let commits = CachedCommitProvider::new(
            registry.clone(),
            CommitStore::new(commits),
            locker,
        );

        Ok(Self {
            module_keys: registry.clone(),
            module_data: Arc::new(module_data),
            commits: Arc::new(commits),
            graph: registry,
        })
    }
}

/// Create the providers selected by `config`
pub fn create_providers(config: &Config) -> BufResult<Providers> {
    let kind = config.registry.provider;
    debug!("Using {} providers", kind);

    let registry = || {
        config
            .registry
            .mirror
            .clone()
            .map(FsRegistry::new)
            .ok_or(BufError::RegistryNotConfigured {
                env_var: REGISTRY_MIRROR_ENV,
            })
    };

    match kind {
        ProviderKind::Nop => Ok(Providers::nop()),
        ProviderKind::Remote => Ok(Providers::remote(registry()?)),
        ProviderKind::Cached => Providers::cached(registry()?, &config.cache_dirs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn remote_without_mirror_is_a_config_error() {
        let mut config = Config::default();
        config.registry.provider = ProviderKind::Remote;
        let err = create_providers(&config).err().unwrap();
        assert!(matches!(err, BufError::RegistryNotConfigured { .. }));
        assert!(err.hint().is_some());
    }

    #[test]
    fn nop_needs_no_mirror() {
        let mut config = Config::default();
        config.registry.provider = ProviderKind::Nop;
        assert!(create_providers(&config).is_ok());
    }

    #[test]
    fn cached_creates_cache_directories() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.dir = Some(temp.path().join("cache"));
        config.registry.mirror = Some(temp.path().join("registry"));

        create_providers(&config).unwrap();

        let dirs = config.cache_dirs();
        for category in [
            CacheCategory::V3Modules,
            CacheCategory::V3Commits,
            CacheCategory::V3WellKnownTypes,
            CacheCategory::V3ModuleLocks,
        ] {
            assert!(dirs.path(category).is_dir());
        }
    }
}
