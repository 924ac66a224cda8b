//! Dependency graphs over module keys

pub mod dag;
pub mod render;
pub mod resolver;

pub use dag::Dag;
pub use render::{to_dot, to_json, to_tree, CommitTimes, GraphNode};
pub use resolver::{
    flatten, resolve_graph, resolve_refs, validate_module_keys_contains,
    validate_unique_digest_type,
};
