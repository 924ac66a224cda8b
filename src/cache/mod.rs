//! Local module cache
//!
//! Maps remote module versions to digest-verified entries on disk.
//!
//! # Consistency Model
//!
//! - Entries are keyed by `registry/owner/name/commit` and never patched
//! - Readers hold a shared lock per entry, writers an exclusive one
//! - Writes land in a temporary sibling and are renamed into place
//! - An entry that fails digest verification is deleted and re-fetched
//!
//! # Instances
//!
//! | Store | Category | Contents |
//! |-------|----------|----------|
//! | Modules | `v3/modules` | module files and direct dependency keys |
//! | Commits | `v3/commits` | commit metadata |
//! | Well-known types | `v3/wellknowntypes` | the well-known types module |

pub mod dirs;
pub mod filelock;
pub mod provider;
pub mod store;

pub use dirs::{ensure_dir, CacheCategory, CacheDirs, CACHE_DIR_ENV};
pub use filelock::{FileLocker, LockGuard, LockMode};
pub use provider::{Cacheable, CachedCommitProvider, CachedModuleDataProvider, CachingStore};
pub use store::{write_atomic, Bucket, CommitStore, ModuleDataStore};
