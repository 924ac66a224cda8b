//! Algorithm-tagged content digests
//!
//! A module digest covers every file in the module plus the digests of its
//! direct dependencies. Files are hashed individually, listed in path order
//! in a manifest, and the manifest is hashed with the same algorithm.

use crate::error::{BufError, BufResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha512};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestType {
    Sha256,
    Sha512,
}

impl DigestType {
    /// Prefix used in the string form of a digest
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the raw hash in bytes
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// All digest types in preference order
    pub fn all() -> &'static [Self] {
        &[Self::Sha256, Self::Sha512]
    }
}

impl fmt::Display for DigestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

impl FromStr for DigestType {
    type Err = BufError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.prefix() == s)
            .ok_or_else(|| BufError::InvalidDigest {
                digest: s.to_string(),
                reason: "unknown digest type".to_string(),
            })
    }
}

/// A content digest: algorithm plus raw hash bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    digest_type: DigestType,
    value: Vec<u8>,
}

impl Digest {
    /// Wrap raw hash bytes, checking the length matches the algorithm
    pub fn new(digest_type: DigestType, value: Vec<u8>) -> BufResult<Self> {
        if value.len() != digest_type.byte_len() {
            return Err(BufError::InvalidDigest {
                digest: format!("{}:{}", digest_type, hex::encode(&value)),
                reason: format!(
                    "expected {} bytes for {}, got {}",
                    digest_type.byte_len(),
                    digest_type,
                    value.len()
                ),
            });
        }
        Ok(Self { digest_type, value })
    }

    /// Parse `type:hex`
    pub fn parse(s: &str) -> BufResult<Self> {
        let (prefix, encoded) = s.split_once(':').ok_or_else(|| BufError::InvalidDigest {
            digest: s.to_string(),
            reason: "expected type:hex".to_string(),
        })?;
        let digest_type: DigestType = prefix.parse().map_err(|_| BufError::InvalidDigest {
            digest: s.to_string(),
            reason: format!("unknown digest type {prefix:?}"),
        })?;
        let value = hex::decode(encoded).map_err(|e| BufError::InvalidDigest {
            digest: s.to_string(),
            reason: e.to_string(),
        })?;
        Self::new(digest_type, value)
    }

    /// Compute the digest of a module's files and its direct dependency digests
    pub fn for_content<'a>(
        digest_type: DigestType,
        files: impl IntoIterator<Item = (&'a str, &'a [u8])>,
        dep_digests: &[Digest],
    ) -> Self {
        let sorted: BTreeMap<&str, &[u8]> = files.into_iter().collect();

        let mut manifest = String::new();
        for (path, content) in sorted {
            manifest.push_str(&hex::encode(digest_type.hash(content)));
            manifest.push_str("  ");
            manifest.push_str(path);
            manifest.push('\n');
        }

        let mut deps: Vec<String> = dep_digests.iter().map(|d| d.to_string()).collect();
        deps.sort();
        for dep in deps {
            manifest.push_str("dep ");
            manifest.push_str(&dep);
            manifest.push('\n');
        }

        Self {
            digest_type,
            value: digest_type.hash(manifest.as_bytes()),
        }
    }

    pub fn digest_type(&self) -> DigestType {
        self.digest_type
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.digest_type, hex::encode(&self.value))
    }
}

impl FromStr for Digest {
    type Err = BufError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = BufError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.to_string()
    }
}

/// Which digest type to request and which legacy digest strings to ignore
///
/// Lock files written by older tool versions can carry digests from hash
/// schemes that are no longer computed. Those are dropped on read so the
/// entry gets re-pinned instead of failing verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestPolicy {
    default_type: DigestType,
    deprecated_prefixes: Vec<String>,
}

impl DigestPolicy {
    pub fn new(default_type: DigestType, deprecated_prefixes: Vec<String>) -> Self {
        Self {
            default_type,
            deprecated_prefixes,
        }
    }

    pub fn default_type(&self) -> DigestType {
        self.default_type
    }

    /// Check whether a digest string uses a deprecated scheme
    pub fn is_deprecated(&self, digest: &str) -> bool {
        let prefix = digest.split([':', '-']).next().unwrap_or_default();
        self.deprecated_prefixes.iter().any(|p| p == prefix)
    }

    /// Parse a digest, returning `None` for deprecated schemes
    pub fn parse_lenient(&self, digest: &str) -> BufResult<Option<Digest>> {
        if self.is_deprecated(digest) {
            debug!("Ignoring deprecated digest {}", digest);
            return Ok(None);
        }
        Digest::parse(digest).map(Some)
    }
}

impl Default for DigestPolicy {
    fn default() -> Self {
        Self::new(DigestType::Sha256, vec!["b1".to_string(), "b3".to_string()])
    }
}
