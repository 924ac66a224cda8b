//! Dependency resolution: refs to keys, keys to a graph, graph to a lock list

use crate::error::{BufError, BufResult};
use crate::graph::Dag;
use crate::module::{DigestType, ModuleFullName, ModuleKey, ModuleRef};
use crate::registry::{GraphProvider, ModuleKeyProvider};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Resolve refs to keys, failing on the first ref that cannot be resolved
pub async fn resolve_refs(
    provider: &dyn ModuleKeyProvider,
    refs: &[ModuleRef],
    digest_type: DigestType,
) -> BufResult<Vec<ModuleKey>> {
    if refs.is_empty() {
        return Ok(Vec::new());
    }
    let results = provider
        .get_module_keys_for_module_refs(refs, digest_type)
        .await?;
    if results.len() != refs.len() {
        return Err(BufError::internal(format!(
            "key provider returned {} results for {} refs",
            results.len(),
            refs.len()
        )));
    }
    let keys = results.into_iter().collect::<BufResult<Vec<_>>>()?;
    debug!("Resolved {} module ref(s)", keys.len());
    Ok(keys)
}

/// Fetch the transitive graph of `keys` and validate it
///
/// Fails on a cycle, on keys of more than one digest type, or on keys of a
/// type other than `digest_type`.
pub async fn resolve_graph(
    provider: &dyn GraphProvider,
    keys: &[ModuleKey],
    digest_type: DigestType,
) -> BufResult<Dag<ModuleKey>> {
    if keys.is_empty() {
        return Ok(Dag::new());
    }
    let dag = provider.get_graph_for_module_keys(keys, digest_type).await?;
    for key in keys {
        if !dag.contains(key) {
            return Err(BufError::internal(format!(
                "graph provider omitted requested module {key}"
            )));
        }
    }
    dag.topological_order()?;
    match validate_unique_digest_type(dag.nodes())? {
        Some(found) if found != digest_type => Err(BufError::MixedDigestTypes {
            found: format!("{digest_type} requested, {found} returned"),
        }),
        _ => Ok(dag),
    }
}

/// Every node exactly once, sorted by full name
///
/// One name at two commits is a conflict.
pub fn flatten(dag: &Dag<ModuleKey>) -> BufResult<Vec<ModuleKey>> {
    let mut by_name: BTreeMap<ModuleFullName, ModuleKey> = BTreeMap::new();
    for key in dag.topological_order()? {
        match by_name.get(key.full_name()) {
            Some(existing) if existing.commit_id() != key.commit_id() => {
                return Err(BufError::DependencyConflict {
                    name: key.full_name().to_string(),
                    commits: format!(
                        "{}, {}",
                        existing.dashless_commit_id(),
                        key.dashless_commit_id()
                    ),
                });
            }
            Some(_) => {}
            None => {
                by_name.insert(key.full_name().clone(), key);
            }
        }
    }
    Ok(by_name.into_values().collect())
}

/// Check every key shares one digest type, returning it
pub fn validate_unique_digest_type(keys: &[ModuleKey]) -> BufResult<Option<DigestType>> {
    let mut found = BTreeSet::new();
    for key in keys {
        found.insert(key.digest()?.digest_type());
    }
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.into_iter().next()),
        _ => Err(BufError::MixedDigestTypes {
            found: found
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Check the lock covers every used module, returning locked names nothing uses
pub fn validate_module_keys_contains(
    used: &BTreeSet<ModuleFullName>,
    locked: &BTreeSet<ModuleFullName>,
) -> BufResult<Vec<ModuleFullName>> {
    let missing: Vec<String> = used.difference(locked).map(ToString::to_string).collect();
    if !missing.is_empty() {
        return Err(BufError::LockMissingEntries {
            names: missing.join(", "),
        });
    }
    Ok(locked.difference(used).cloned().collect())
}
