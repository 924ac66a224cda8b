//! Configuration schema for buf
//!
//! Configuration is stored at `~/.config/buf/config.toml`

use crate::module::{DigestPolicy, DigestType};
use crate::registry::ProviderKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Module cache settings
    pub cache: CacheConfig,

    /// Registry settings
    pub registry: RegistryConfig,

    /// Digest settings
    pub digest: DigestConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Hide dependency warnings (unused declared deps)
    pub suppress_warnings: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            suppress_warnings: false,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Base cache directory (default: `~/.cache/buf`)
    pub dir: Option<PathBuf>,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory served as the registry
    pub mirror: Option<PathBuf>,

    /// Provider chain: "nop", "remote" or "cached"
    pub provider: ProviderKind,

    /// Deadline for one dependency command, in seconds
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mirror: None,
            provider: ProviderKind::Cached,
            timeout_secs: 120,
        }
    }
}

/// Digest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Digest type requested for new lock entries
    pub default_type: DigestType,

    /// Digest prefixes dropped when reading lock files
    pub deprecated_prefixes: Vec<String>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        let policy = DigestPolicy::default();
        Self {
            default_type: policy.default_type(),
            deprecated_prefixes: vec!["b1".to_string(), "b3".to_string()],
        }
    }
}

impl DigestConfig {
    pub fn policy(&self) -> DigestPolicy {
        DigestPolicy::new(self.default_type, self.deprecated_prefixes.clone())
    }
}
