//! Deterministic catalog resolution.
//!
//! The image's SHA-256 fingerprint picks one identifier from the list the
//! catalog store hands us for this call. Same bytes, same list: same entry.

use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::types::CatalogId;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog store unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog query failed: {0}")]
    Query(String),
}

// ═══════════════════════════════════════════════════════════
// Fingerprint
// ═══════════════════════════════════════════════════════════

/// What the fingerprint is computed from.
#[derive(Debug, Clone, Copy)]
pub enum FingerprintSource<'a> {
    /// Raw image bytes (the normal case).
    Bytes(&'a [u8]),
    /// Identifying token, e.g. the file path, when the bytes could not be read.
    Token(&'a str),
}

/// SHA-256 of the image content. A uniform selector, not a security primitive.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn compute(source: FingerprintSource<'_>) -> Self {
        let digest = match source {
            FingerprintSource::Bytes(bytes) => Sha256::digest(bytes),
            FingerprintSource::Token(token) => Sha256::digest(token.as_bytes()),
        };
        Self(digest.into())
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self::compute(FingerprintSource::Bytes(bytes))
    }

    /// First 8 bytes, big-endian.
    pub fn selector(&self) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(prefix)
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_base64())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

// ═══════════════════════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════════════════════

/// Maps a fingerprint onto an ordered identifier list.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogResolver;

impl CatalogResolver {
    /// `ids[selector % len]`, or `None` for an empty list.
    pub fn resolve<'a>(&self, fingerprint: &Fingerprint, ids: &'a [CatalogId]) -> Option<&'a CatalogId> {
        if ids.is_empty() {
            return None;
        }
        let index = (fingerprint.selector() % ids.len() as u64) as usize;
        ids.get(index)
    }
}

// ═══════════════════════════════════════════════════════════
// Catalog store (external collaborator)
// ═══════════════════════════════════════════════════════════

/// Read-only view of the disease catalog. Implemented by the service layer
/// over its database; the pipeline never writes through it.
pub trait CatalogStore: Send + Sync {
    /// All identifiers, in the store's stable order.
    fn list_ids(&self) -> Result<Vec<CatalogId>, CatalogError>;

    /// Identifiers whose record belongs to `category`.
    fn list_ids_by_category(&self, category: &str) -> Result<Vec<CatalogId>, CatalogError>;
}

/// One catalog record as far as the pipeline cares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: CatalogId,
    #[serde(default)]
    pub category: Option<String>,
}

/// In-memory catalog, insertion-ordered.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    entries: Vec<CatalogEntry>,
}

impl InMemoryCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Uncategorised catalog from bare identifiers.
    pub fn from_ids<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<CatalogId>,
    {
        Self {
            entries: ids
                .into_iter()
                .map(|id| CatalogEntry {
                    id: id.into(),
                    category: None,
                })
                .collect(),
        }
    }

    /// Parse a JSON array of `{ "id": ..., "category": ... }` entries.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CatalogStore for InMemoryCatalog {
    fn list_ids(&self) -> Result<Vec<CatalogId>, CatalogError> {
        Ok(self.entries.iter().map(|e| e.id.clone()).collect())
    }

    fn list_ids_by_category(&self, category: &str) -> Result<Vec<CatalogId>, CatalogError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.category.as_deref() == Some(category))
            .map(|e| e.id.clone())
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
