//! Module identity and content types
//!
//! A module is referenced by name (`ModuleFullName`), by a user-facing
//! pointer (`ModuleRef`), or pinned to an exact, content-addressed version
//! (`ModuleKey`). Providers turn keys into `ModuleData` and `Commit` values.

pub mod data;
pub mod digest;
pub mod full_name;
pub mod key;
pub mod reference;

pub use data::{is_well_known_types, Commit, ModuleData, WELL_KNOWN_TYPES_MODULE};
pub use digest::{Digest, DigestPolicy, DigestType};
pub use full_name::ModuleFullName;
pub use key::{parse_commit_id, ModuleKey};
pub use reference::ModuleRef;
