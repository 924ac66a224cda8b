//! `buf.yaml` module configuration

use crate::error::{BufError, BufResult};
use crate::module::ModuleRef;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const BUF_YAML_FILE: &str = "buf.yaml";

/// One local module of a v2 workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    #[serde(default = "current_dir")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn current_dir() -> String {
    ".".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufYaml {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<ModuleEntry>,
}

fn default_version() -> String {
    "v1".to_string()
}

impl BufYaml {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(BUF_YAML_FILE)
    }

    /// Load `buf.yaml` from a workspace directory
    pub fn load(dir: &Path) -> BufResult<Self> {
        let path = Self::path_in(dir);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BufError::WorkspaceNotFound(dir.to_path_buf()),
            _ => BufError::io(format!("reading {}", path.display()), e),
        })?;
        Self::parse(&content, &path)
    }

    pub fn parse(content: &str, path: &Path) -> BufResult<Self> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| BufError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        match config.version.as_str() {
            "v1beta1" | "v1" | "v2" => Ok(config),
            other => Err(BufError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: format!("unknown version {other:?}"),
            }),
        }
    }

    pub fn is_v2(&self) -> bool {
        self.version == "v2"
    }

    /// Declared dependencies as refs
    pub fn dep_refs(&self) -> BufResult<Vec<ModuleRef>> {
        self.deps.iter().map(|d| ModuleRef::parse(d)).collect()
    }

    /// Local module roots; a v1 file describes a single module at its own directory
    pub fn module_entries(&self) -> Vec<ModuleEntry> {
        if self.modules.is_empty() {
            return vec![ModuleEntry {
                path: current_dir(),
                name: self.name.clone(),
            }];
        }
        self.modules.clone()
    }
}
