//! buf - Protobuf module dependency manager
//!
//! Resolves module dependencies against a registry, keeps `buf.lock` in
//! step with the imports a workspace actually uses, and caches module
//! content locally.

pub mod cache;
pub mod cli;
pub mod config;
pub mod dep;
pub mod error;
pub mod graph;
pub mod lockfile;
pub mod module;
pub mod registry;
pub mod workspace;

pub use error::{BufError, BufResult};
