//! Error types for buf
//!
//! All modules use `BufResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for buf operations
pub type BufResult<T> = Result<T, BufError>;

/// All errors that can occur in buf
#[derive(Error, Debug)]
pub enum BufError {
    // Configuration errors
    #[error(
        "Cache path {path} exists but is not a directory. \
         Remove it or set {env_var} to another location"
    )]
    CacheDirNotDirectory {
        path: PathBuf,
        env_var: &'static str,
    },

    #[error(
        "Cache directory {path} is not readable and writable by its owner. \
         Fix its permissions or set {env_var} to another location"
    )]
    CacheDirNotWritable {
        path: PathBuf,
        env_var: &'static str,
    },

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No registry configured. Set registry.mirror in the config file or {env_var}")]
    RegistryNotConfigured { env_var: &'static str },

    // Module identity errors
    #[error("Invalid module name {name:?}: {reason}")]
    InvalidModuleFullName { name: String, reason: String },

    #[error("Invalid module reference {reference:?}: {reason}")]
    InvalidModuleRef { reference: String, reason: String },

    #[error("Invalid digest {digest:?}: {reason}")]
    InvalidDigest { digest: String, reason: String },

    #[error("Invalid commit ID {0:?}")]
    InvalidCommitId(String),

    #[error("Failed to compute digest for {key}: {reason}")]
    DigestCompute { key: String, reason: String },

    // Registry errors
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    #[error("Registry {operation} failed for {subject}: {reason}")]
    Remote {
        operation: &'static str,
        subject: String,
        reason: String,
    },

    #[error("Timed out after {secs}s while running {operation}")]
    Timeout { operation: String, secs: u64 },

    // Cache errors
    #[error("Digest mismatch for {key}: expected {expected}, got {actual}")]
    DigestMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Corrupt cache entry at {path}: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Graph errors
    #[error("Dependencies resolved with more than one digest type: {found}")]
    MixedDigestTypes { found: String },

    #[error("Dependency cycle detected: {cycle}")]
    GraphCycle { cycle: String },

    #[error("Module {name} resolved to more than one commit: {commits}")]
    DependencyConflict { name: String, commits: String },

    // Dependency and lock file errors
    #[error("Module {name} is depended on but is not declared. Add {name} to your buf.yaml deps")]
    UndeclaredDependency { name: String },

    #[error("buf.lock does not contain {names}. Run: buf dep update")]
    LockMissingEntries { names: String },

    #[error("Invalid lock file {path}: {reason}")]
    LockFileInvalid { path: PathBuf, reason: String },

    #[error("Failed to update {path}, previous content restored: {source}")]
    LockUpdateRolledBack {
        path: PathBuf,
        #[source]
        source: Box<BufError>,
    },

    #[error("Failed to update {path} ({source}) and could not restore previous content: {restore}")]
    LockRestoreFailed {
        path: PathBuf,
        #[source]
        source: Box<BufError>,
        restore: String,
    },

    #[error("No buf.yaml found in {0}")]
    WorkspaceNotFound(PathBuf),

    #[error("Import {import:?} in {file} does not resolve to any module")]
    ImportNotFound { import: String, file: String },

    #[error("File {path} is provided by both {first} and {second}")]
    DuplicateFile {
        path: String,
        first: String,
        second: String,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl BufError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if the error indicates a bug rather than a user or environment problem
    pub fn is_internal(&self) -> bool {
        match self {
            Self::Internal(_) => true,
            Self::LockUpdateRolledBack { source, .. } | Self::LockRestoreFailed { source, .. } => {
                source.is_internal()
            }
            _ => false,
        }
    }

    /// Check if the error means the requested module or commit does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ModuleNotFound(_) | Self::CommitNotFound(_))
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CacheDirNotDirectory { .. } | Self::CacheDirNotWritable { .. } => {
                Some("Set BUF_CACHE_DIR to a writable directory")
            }
            Self::RegistryNotConfigured { .. } => {
                Some("Set BUF_REGISTRY_MIRROR to a registry directory")
            }
            Self::LockMissingEntries { .. } => Some("Run: buf dep update"),
            Self::UndeclaredDependency { .. } => {
                Some("Add the module to deps in buf.yaml, then run: buf dep update")
            }
            Self::WorkspaceNotFound(_) => {
                Some("Run the command from a directory containing buf.yaml")
            }
            Self::Internal(_) => Some("This is a bug in buf, please report it"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = BufError::UndeclaredDependency {
            name: "buf.build/acme/units".to_string(),
        };
        assert!(err
            .to_string()
            .contains("Add buf.build/acme/units to your buf.yaml deps"));
    }

    #[test]
    fn cache_dir_error_names_env_var() {
        let err = BufError::CacheDirNotDirectory {
            path: PathBuf::from("/tmp/buf"),
            env_var: "BUF_CACHE_DIR",
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/buf"));
        assert!(msg.contains("BUF_CACHE_DIR"));
    }

    #[test]
    fn error_hint() {
        let err = BufError::LockMissingEntries {
            names: "buf.build/acme/a".to_string(),
        };
        assert_eq!(err.hint(), Some("Run: buf dep update"));
    }

    #[test]
    fn internal_is_distinguished() {
        assert!(BufError::internal("boom").is_internal());
        assert!(!BufError::User("bad input".to_string()).is_internal());

        let wrapped = BufError::LockUpdateRolledBack {
            path: PathBuf::from("buf.lock"),
            source: Box::new(BufError::internal("boom")),
        };
        assert!(wrapped.is_internal());
    }

    #[test]
    fn not_found_classification() {
        assert!(BufError::ModuleNotFound("buf.build/a/b".to_string()).is_not_found());
        assert!(!BufError::internal("x").is_not_found());
    }
}
