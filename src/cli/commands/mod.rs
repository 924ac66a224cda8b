//! CLI command implementations

pub mod cache;
pub mod config;
pub mod dep;

pub use cache::execute as cache;
pub use config::execute as config;
pub use dep::execute as dep;
