//! Configuration management for buf

pub mod buf_yaml;
pub mod schema;

pub use buf_yaml::{BufYaml, ModuleEntry, BUF_YAML_FILE};
pub use schema::Config;

use crate::cache::{CacheDirs, CACHE_DIR_ENV};
use crate::error::{BufError, BufResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "BUF_CONFIG";

/// Environment variable naming the registry mirror directory
pub const REGISTRY_MIRROR_ENV: &str = "BUF_REGISTRY_MIRROR";

/// Environment variable hiding dependency warnings when set
pub const SUPPRESS_WARNINGS_ENV: &str = "BUF_BETA_SUPPRESS_WARNINGS";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("buf")
            .join("config.toml")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> BufResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> BufResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| BufError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| BufError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> BufResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            BufError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> BufResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BufError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(dir) = set(CACHE_DIR_ENV) {
            debug!("Cache directory overridden by {}", CACHE_DIR_ENV);
            self.cache.dir = Some(PathBuf::from(dir));
        }
        if let Some(mirror) = set(REGISTRY_MIRROR_ENV) {
            debug!("Registry mirror overridden by {}", REGISTRY_MIRROR_ENV);
            self.registry.mirror = Some(PathBuf::from(mirror));
        }
        if set(SUPPRESS_WARNINGS_ENV).is_some() {
            self.general.suppress_warnings = true;
        }
    }

    /// Cache directories rooted at the configured or default base
    pub fn cache_dirs(&self) -> CacheDirs {
        CacheDirs::new(
            self.cache
                .dir
                .clone()
                .unwrap_or_else(CacheDirs::default_base),
        )
    }
}
