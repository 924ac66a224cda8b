//! Registry provider abstraction
//!
//! Four provider kinds cover everything dependency resolution needs from a
//! registry. Every batch call returns one result per input, in input order;
//! the outer `Err` is reserved for failures of the whole batch (transport,
//! timeout), so one missing module never fails its siblings.

pub mod factory;
pub mod fs;

use crate::error::{BufError, BufResult};
use crate::graph::Dag;
use crate::module::{is_well_known_types, Commit, DigestType, ModuleData, ModuleKey, ModuleRef};
use async_trait::async_trait;
use std::sync::Arc;

pub use factory::{create_providers, ProviderKind, Providers};
pub use fs::FsRegistry;

/// Resolves user-facing references to pinned module keys
#[async_trait]
pub trait ModuleKeyProvider: Send + Sync {
    async fn get_module_keys_for_module_refs(
        &self,
        refs: &[ModuleRef],
        digest_type: DigestType,
    ) -> BufResult<Vec<BufResult<ModuleKey>>>;
}

/// Fetches module content for pinned keys
#[async_trait]
pub trait ModuleDataProvider: Send + Sync {
    async fn get_module_datas_for_module_keys(
        &self,
        keys: &[ModuleKey],
    ) -> BufResult<Vec<BufResult<ModuleData>>>;
}

/// Fetches commit metadata for pinned keys
#[async_trait]
pub trait CommitProvider: Send + Sync {
    async fn get_commits_for_module_keys(
        &self,
        keys: &[ModuleKey],
    ) -> BufResult<Vec<BufResult<Commit>>>;
}

/// Builds the transitive dependency graph of a set of keys
///
/// Every key in the returned graph carries a digest of `digest_type`.
#[async_trait]
pub trait GraphProvider: Send + Sync {
    async fn get_graph_for_module_keys(
        &self,
        keys: &[ModuleKey],
        digest_type: DigestType,
    ) -> BufResult<Dag<ModuleKey>>;
}

/// Provider that knows no modules
#[derive(Debug, Default, Clone, Copy)]
pub struct NopProvider;

#[async_trait]
impl ModuleKeyProvider for NopProvider {
    async fn get_module_keys_for_module_refs(
        &self,
        refs: &[ModuleRef],
        _digest_type: DigestType,
    ) -> BufResult<Vec<BufResult<ModuleKey>>> {
        Ok(refs
            .iter()
            .map(|r| Err(BufError::ModuleNotFound(r.to_string())))
            .collect())
    }
}

#[async_trait]
impl ModuleDataProvider for NopProvider {
    async fn get_module_datas_for_module_keys(
        &self,
        keys: &[ModuleKey],
    ) -> BufResult<Vec<BufResult<ModuleData>>> {
        Ok(keys
            .iter()
            .map(|k| Err(BufError::ModuleNotFound(k.to_string())))
            .collect())
    }
}

#[async_trait]
impl CommitProvider for NopProvider {
    async fn get_commits_for_module_keys(
        &self,
        keys: &[ModuleKey],
    ) -> BufResult<Vec<BufResult<Commit>>> {
        Ok(keys
            .iter()
            .map(|k| Err(BufError::CommitNotFound(k.to_string())))
            .collect())
    }
}

#[async_trait]
impl GraphProvider for NopProvider {
    async fn get_graph_for_module_keys(
        &self,
        keys: &[ModuleKey],
        _digest_type: DigestType,
    ) -> BufResult<Dag<ModuleKey>> {
        match keys.first() {
            None => Ok(Dag::new()),
            Some(key) => Err(BufError::ModuleNotFound(key.full_name().to_string())),
        }
    }
}

/// Sends well-known types keys to one provider and everything else to another
pub struct WellKnownTypesRouter {
    modules: Arc<dyn ModuleDataProvider>,
    well_known_types: Arc<dyn ModuleDataProvider>,
}

impl WellKnownTypesRouter {
    pub fn new(
        modules: Arc<dyn ModuleDataProvider>,
        well_known_types: Arc<dyn ModuleDataProvider>,
    ) -> Self {
        Self {
            modules,
            well_known_types,
        }
    }
}

#[async_trait]
impl ModuleDataProvider for WellKnownTypesRouter {
    async fn get_module_datas_for_module_keys(
        &self,
        keys: &[ModuleKey],
    ) -> BufResult<Vec<BufResult<ModuleData>>> {
        let (wkt, other): (Vec<_>, Vec<_>) = keys
            .iter()
            .cloned()
            .enumerate()
            .partition(|(_, key)| is_well_known_types(key.full_name()));

        let wkt_keys: Vec<ModuleKey> = wkt.iter().map(|(_, k)| k.clone()).collect();
        let other_keys: Vec<ModuleKey> = other.iter().map(|(_, k)| k.clone()).collect();

        let wkt_results = if wkt_keys.is_empty() {
            Vec::new()
        } else {
            self.well_known_types
                .get_module_datas_for_module_keys(&wkt_keys)
                .await?
        };
        let other_results = if other_keys.is_empty() {
            Vec::new()
        } else {
            self.modules
                .get_module_datas_for_module_keys(&other_keys)
                .await?
        };

        let mut slots: Vec<Option<BufResult<ModuleData>>> = (0..keys.len()).map(|_| None).collect();
        for ((idx, _), result) in wkt.into_iter().zip(wkt_results) {
            slots[idx] = Some(result);
        }
        for ((idx, _), result) in other.into_iter().zip(other_results) {
            slots[idx] = Some(result);
        }
        slots
            .into_iter()
            .zip(keys)
            .map(|(slot, key)| {
                slot.ok_or_else(|| {
                    BufError::internal(format!("provider returned no result for {key}"))
                })
            })
            .collect()
    }
}
