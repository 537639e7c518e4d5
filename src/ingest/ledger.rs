//! Content hash ledger: document path -> SHA-256 of the file bytes.
//!
//! The ledger is the unit of change detection. A file is re-embedded only when its
//! current digest differs from the ledger entry recorded by the last successful rebuild.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, RagagentError};

/// Compute SHA256 hash of file contents
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let content = std::fs::read(path).map_err(RagagentError::Io)?;
    Ok(digest_bytes(&content))
}

/// Lowercase hex SHA256 of a byte slice
pub fn digest_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// A well-formed digest is 64 lowercase hex characters.
pub fn is_valid_digest(digest: &str) -> bool {
    digest.len() == 64 && digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Mapping of relative document path to content digest.
///
/// Backed by a `BTreeMap` so iteration and serialization order are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashLedger {
    entries: BTreeMap<String, String>,
}

impl HashLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn insert(&mut self, path: impl Into<String>, digest: impl Into<String>) {
        self.entries.insert(path.into(), digest.into());
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.entries.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, d)| (p.as_str(), d.as_str()))
    }

    /// Whether `path` is recorded with exactly `digest`.
    pub fn matches(&self, path: &str, digest: &str) -> bool {
        self.get(path) == Some(digest)
    }

    /// Paths present here but absent from `next` (files removed between passes).
    pub fn removed_since<'a>(&'a self, next: &'a HashLedger) -> impl Iterator<Item = &'a str> {
        self.entries
            .keys()
            .filter(move |p| !next.contains(p))
            .map(String::as_str)
    }

    /// Byte-stable JSON form (keys sorted).
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.entries)?)
    }

    /// Parse and validate a ledger exported with [`HashLedger::to_canonical_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: BTreeMap<String, String> = serde_json::from_str(json)
            .map_err(|e| RagagentError::LedgerCorrupt(e.to_string()))?;
        let ledger = Self { entries };
        ledger.validate()?;
        Ok(ledger)
    }

    /// Reject entries that could not have been produced by [`digest_bytes`].
    pub fn validate(&self) -> Result<()> {
        for (path, digest) in &self.entries {
            if path.is_empty() {
                return Err(RagagentError::LedgerCorrupt("empty document path".to_string()));
            }
            if !is_valid_digest(digest) {
                return Err(RagagentError::LedgerCorrupt(format!(
                    "invalid digest for {}: {:?}",
                    path, digest
                )));
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for HashLedger {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
