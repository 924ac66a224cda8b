//! Module references: a module name with an optional label or commit

use crate::error::{BufError, BufResult};
use crate::module::full_name::ModuleFullName;
use std::fmt;
use std::str::FromStr;

/// User-facing pointer to a module version, resolved to a key by a provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleRef {
    full_name: ModuleFullName,
    reference: Option<String>,
}

impl ModuleRef {
    pub fn new(full_name: ModuleFullName, reference: Option<String>) -> Self {
        Self {
            full_name,
            reference,
        }
    }

    /// Parse `registry/owner/name[:reference]`
    ///
    /// The registry component may itself carry a port, so only a colon after
    /// the last slash separates the reference.
    pub fn parse(s: &str) -> BufResult<Self> {
        let last_slash = s.rfind('/').ok_or_else(|| BufError::InvalidModuleRef {
            reference: s.to_string(),
            reason: "expected registry/owner/name[:reference]".to_string(),
        })?;
        let (name_part, reference) = match s[last_slash..].find(':') {
            Some(offset) => {
                let split = last_slash + offset;
                let reference = &s[split + 1..];
                if reference.is_empty() {
                    return Err(BufError::InvalidModuleRef {
                        reference: s.to_string(),
                        reason: "reference after ':' must not be empty".to_string(),
                    });
                }
                (&s[..split], Some(reference.to_string()))
            }
            None => (s, None),
        };

        let full_name =
            ModuleFullName::parse(name_part).map_err(|e| BufError::InvalidModuleRef {
                reference: s.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::new(full_name, reference))
    }

    pub fn full_name(&self) -> &ModuleFullName {
        &self.full_name
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Some(reference) => write!(f, "{}:{}", self.full_name, reference),
            None => write!(f, "{}", self.full_name),
        }
    }
}

impl FromStr for ModuleRef {
    type Err = BufError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
