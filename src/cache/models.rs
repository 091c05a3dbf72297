//! Bucket naming and cache statistics models.

// Author: kelexine (https://github.com/kelexine)

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two logical buckets every release owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    /// Core shell, filled at install time.
    Static,
    /// Everything else, filled lazily by the strategies.
    Dynamic,
}

impl BucketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketKind::Static => "static",
            BucketKind::Dynamic => "dynamic",
        }
    }
}

/// `<kind>-<version>`, e.g. `static-v1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketName {
    pub kind: BucketKind,
    pub version: String,
}

impl BucketName {
    pub fn new(kind: BucketKind, version: &str) -> Self {
        Self {
            kind,
            version: version.to_string(),
        }
    }

    pub fn static_for(version: &str) -> Self {
        Self::new(BucketKind::Static, version)
    }

    pub fn dynamic_for(version: &str) -> Self {
        Self::new(BucketKind::Dynamic, version)
    }

    /// Parse a stored bucket name. Names not produced by this crate yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let (kind, version) = name.split_once('-')?;
        if version.is_empty() {
            return None;
        }
        let kind = match kind {
            "static" => BucketKind::Static,
            "dynamic" => BucketKind::Dynamic,
            _ => return None,
        };
        Some(Self::new(kind, version))
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.as_str(), self.version)
    }
}

/// Statistics for cache operations.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheStats {
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries inserted or overwritten.
    pub writes: u64,
    /// Writes rejected or failed on disk.
    pub write_failures: u64,
    /// Buckets deleted.
    pub deletions: u64,
}
