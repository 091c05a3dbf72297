//! Request classification.
//!
//! Decides, for every intercepted request, whether the coordinator handles it
//! at all and, if so, which strategy runs against which bucket.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::cache::{BucketKind, BucketName};
use crate::models::RequestDescriptor;
use serde::Serialize;
use std::collections::HashSet;

/// Retrieval algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
}

/// Resource class of a same-origin GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    /// Part of the core shell manifest.
    Static,
    /// A document load outside the manifest.
    Navigation,
    /// Everything else on the origin.
    Other,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Static => "static",
            ResourceClass::Navigation => "navigation",
            ResourceClass::Other => "other",
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            ResourceClass::Navigation => Strategy::NetworkFirst,
            ResourceClass::Static | ResourceClass::Other => Strategy::CacheFirst,
        }
    }

    pub fn bucket_kind(&self) -> BucketKind {
        match self {
            ResourceClass::Static => BucketKind::Static,
            ResourceClass::Navigation | ResourceClass::Other => BucketKind::Dynamic,
        }
    }
}

/// Outcome of classifying one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Not ours: forwarded untouched and never stored.
    Passthrough,
    Handle {
        class: ResourceClass,
        strategy: Strategy,
        bucket: BucketName,
    },
}

/// Classifier bound to one origin and one release.
#[derive(Debug, Clone)]
pub struct Classifier {
    origin: String,
    version: String,
    manifest: HashSet<String>,
}

impl Classifier {
    pub fn new(origin: &str, version: &str, manifest: &[String]) -> Self {
        Self {
            origin: origin.to_string(),
            version: version.to_string(),
            manifest: manifest.iter().cloned().collect(),
        }
    }

    /// Rules, first match wins: foreign origin or non-GET → passthrough;
    /// exact manifest path → static; document destination → navigation;
    /// otherwise → other.
    pub fn classify(&self, request: &RequestDescriptor) -> Route {
        if request.origin() != self.origin || !request.is_get() {
            return Route::Passthrough;
        }

        let class = if self.manifest.contains(request.path()) {
            ResourceClass::Static
        } else if request.destination.is_navigation() {
            ResourceClass::Navigation
        } else {
            ResourceClass::Other
        };

        Route::Handle {
            class,
            strategy: class.strategy(),
            bucket: BucketName::new(class.bucket_kind(), &self.version),
        }
    }
}
