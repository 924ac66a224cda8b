//! Module content and commit metadata as returned by providers

use crate::error::{BufError, BufResult};
use crate::module::digest::{Digest, DigestType};
use crate::module::full_name::ModuleFullName;
use crate::module::key::ModuleKey;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Name of the module that ships the Protobuf well-known types
pub const WELL_KNOWN_TYPES_MODULE: &str = "buf.build/protocolbuffers/wellknowntypes";

/// Check whether a module is the well-known types module
pub fn is_well_known_types(full_name: &ModuleFullName) -> bool {
    full_name.to_string() == WELL_KNOWN_TYPES_MODULE
}

/// The files of one module version plus its direct dependency keys
#[derive(Debug, Clone)]
pub struct ModuleData {
    key: ModuleKey,
    files: BTreeMap<String, Vec<u8>>,
    dep_keys: Vec<ModuleKey>,
}

impl ModuleData {
    pub fn new(key: ModuleKey, files: BTreeMap<String, Vec<u8>>, dep_keys: Vec<ModuleKey>) -> Self {
        Self {
            key,
            files,
            dep_keys,
        }
    }

    pub fn key(&self) -> &ModuleKey {
        &self.key
    }

    pub fn files(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.files
    }

    pub fn dep_keys(&self) -> &[ModuleKey] {
        &self.dep_keys
    }

    /// Compute the digest of this content with the given algorithm
    pub fn compute_digest(&self, digest_type: DigestType) -> BufResult<Digest> {
        let dep_digests = self
            .dep_keys
            .iter()
            .map(ModuleKey::digest)
            .collect::<BufResult<Vec<_>>>()?;
        Ok(Digest::for_content(
            digest_type,
            self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice())),
            &dep_digests,
        ))
    }

    /// Check the content against the digest the expected key pins
    pub fn verify(&self, expected: &ModuleKey) -> BufResult<()> {
        if self.key != *expected {
            return Err(BufError::internal(format!(
                "module data for {} returned for {}",
                self.key, expected
            )));
        }
        let expected_digest = expected.digest()?;
        let actual = self.compute_digest(expected_digest.digest_type())?;
        if actual != expected_digest {
            return Err(BufError::DigestMismatch {
                key: expected.to_string(),
                expected: expected_digest.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

/// Commit metadata for one module version
#[derive(Debug, Clone)]
pub struct Commit {
    key: ModuleKey,
    create_time: DateTime<Utc>,
}

impl Commit {
    pub fn new(key: ModuleKey, create_time: DateTime<Utc>) -> Self {
        Self { key, create_time }
    }

    pub fn key(&self) -> &ModuleKey {
        &self.key
    }

    pub fn create_time(&self) -> DateTime<Utc> {
        self.create_time
    }

    /// Check the commit refers to the same module version and digest
    pub fn verify(&self, expected: &ModuleKey) -> BufResult<()> {
        if self.key != *expected {
            return Err(BufError::internal(format!(
                "commit for {} returned for {}",
                self.key, expected
            )));
        }
        let expected_digest = expected.digest()?;
        let actual = self.key.digest()?;
        if actual != expected_digest {
            return Err(BufError::DigestMismatch {
                key: expected.to_string(),
                expected: expected_digest.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn files(content: &str) -> BTreeMap<String, Vec<u8>> {
        BTreeMap::from([(
            "acme/v1/weather.proto".to_string(),
            content.as_bytes().to_vec(),
        )])
    }

    fn key_for(files: &BTreeMap<String, Vec<u8>>) -> ModuleKey {
        let digest = Digest::for_content(
            DigestType::Sha256,
            files.iter().map(|(p, c)| (p.as_str(), c.as_slice())),
            &[],
        );
        ModuleKey::new(
            ModuleFullName::parse("buf.build/acme/weather").unwrap(),
            Uuid::new_v4(),
            digest,
        )
    }

    #[test]
    fn verify_accepts_matching_content() {
        let f = files("syntax = \"proto3\";");
        let key = key_for(&f);
        let data = ModuleData::new(key.clone(), f, vec![]);
        assert!(data.verify(&key).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_content() {
        let key = key_for(&files("syntax = \"proto3\";"));
        let data = ModuleData::new(key.clone(), files("tampered"), vec![]);
        let err = data.verify(&key).unwrap_err();
        assert!(matches!(err, BufError::DigestMismatch { .. }));
    }

    #[test]
    fn well_known_types_detection() {
        let wkt = ModuleFullName::parse(WELL_KNOWN_TYPES_MODULE).unwrap();
        assert!(is_well_known_types(&wkt));
        let other = ModuleFullName::parse("buf.build/acme/weather").unwrap();
        assert!(!is_well_known_types(&other));
    }
}
