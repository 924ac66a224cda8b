//! Fully-qualified module names (`registry/owner/name`)

use crate::error::{BufError, BufResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A module name qualified by registry and owner
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleFullName {
    registry: String,
    owner: String,
    name: String,
}

impl ModuleFullName {
    /// Build a full name from its three components
    pub fn new(
        registry: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> BufResult<Self> {
        let full_name = Self {
            registry: registry.into(),
            owner: owner.into(),
            name: name.into(),
        };
        full_name.validate()?;
        Ok(full_name)
    }

    /// Parse `registry/owner/name`
    pub fn parse(s: &str) -> BufResult<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [registry, owner, name] => Self::new(*registry, *owner, *name).map_err(|e| match e {
                BufError::InvalidModuleFullName { reason, .. } => BufError::InvalidModuleFullName {
                    name: s.to_string(),
                    reason,
                },
                other => other,
            }),
            _ => Err(BufError::InvalidModuleFullName {
                name: s.to_string(),
                reason: "expected registry/owner/name".to_string(),
            }),
        }
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> BufResult<()> {
        for (label, value) in [
            ("registry", &self.registry),
            ("owner", &self.owner),
            ("name", &self.name),
        ] {
            if value.is_empty() {
                return Err(self.invalid(format!("{label} must not be empty")));
            }
            if value == "." || value == ".." {
                return Err(self.invalid(format!("{label} must not be {value:?}")));
            }
            if value
                .chars()
                .any(|c| c.is_whitespace() || c == '/' || c == '\\' || c == '\0')
            {
                return Err(self.invalid(format!("{label} contains an invalid character")));
            }
        }
        if self.owner.contains(':') || self.name.contains(':') {
            return Err(self.invalid("owner and name must not contain ':'".to_string()));
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> BufError {
        BufError::InvalidModuleFullName {
            name: format!("{}/{}/{}", self.registry, self.owner, self.name),
            reason,
        }
    }
}

impl fmt::Display for ModuleFullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.registry, self.owner, self.name)
    }
}

impl FromStr for ModuleFullName {
    type Err = BufError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ModuleFullName {
    type Error = BufError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ModuleFullName> for String {
    fn from(value: ModuleFullName) -> Self {
        value.to_string()
    }
}
