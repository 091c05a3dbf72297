//! Cache-first and network-first retrieval.
//!
//! Both strategies return as soon as they have a response. When that response
//! came from the network, a clone is handed to [`WriteBehind`] and stored in
//! the background; a failed write is logged and never affects the caller.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod write_behind;

pub use write_behind::WriteBehind;

use crate::cache::{BucketName, CacheStore};
use crate::classifier::Strategy;
use crate::error::Result;
use crate::models::{Destination, RequestDescriptor, Response};
use crate::network::Network;
use reqwest::Url;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Network,
    /// The cached root document stood in for a failed navigation.
    OfflineFallback,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::Network => "network",
            Source::OfflineFallback => "offline_fallback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Served {
    pub response: Response,
    pub source: Source,
}

impl Served {
    fn new(response: Response, source: Source) -> Self {
        Self { response, source }
    }
}

/// Executes strategies for one release against the shared store.
pub struct StrategyEngine {
    store: Arc<CacheStore>,
    network: Arc<dyn Network>,
    writes: Arc<WriteBehind>,
    /// Cache key of the root document (`GET <origin>/`).
    root_key: String,
    /// Buckets searched for the root document, in order.
    root_buckets: [BucketName; 2],
}

impl StrategyEngine {
    pub fn new(
        origin: &Url,
        version: &str,
        store: Arc<CacheStore>,
        network: Arc<dyn Network>,
        writes: Arc<WriteBehind>,
    ) -> Result<Self> {
        let root_key = RequestDescriptor::for_path(origin, "/", Destination::Document)?.cache_key();
        Ok(Self {
            store,
            network,
            writes,
            root_key,
            root_buckets: [BucketName::static_for(version), BucketName::dynamic_for(version)],
        })
    }

    pub async fn execute(
        &self,
        strategy: Strategy,
        request: &RequestDescriptor,
        bucket: &BucketName,
    ) -> Result<Served> {
        match strategy {
            Strategy::CacheFirst => self.cache_first(request, bucket).await,
            Strategy::NetworkFirst => self.network_first(request, bucket).await,
        }
    }

    /// Stored entry if present, otherwise the network (and store the result).
    pub async fn cache_first(&self, request: &RequestDescriptor, bucket: &BucketName) -> Result<Served> {
        let key = request.cache_key();
        if let Some(hit) = self.store.match_in(bucket, &key) {
            debug!("Cache hit in {} for {}", bucket, key);
            return Ok(Served::new(hit, Source::Cache));
        }

        debug!("Cache miss in {} for {}", bucket, key);
        match self.network.fetch(request).await {
            Ok(response) => {
                self.store_behind(bucket, key, &response);
                Ok(Served::new(response, Source::Network))
            }
            Err(e) => {
                if request.destination.is_navigation() {
                    if let Some(root) = self.root_document() {
                        debug!("Serving cached root document for {}", key);
                        return Ok(Served::new(root, Source::OfflineFallback));
                    }
                }
                debug!("Request failed and no cache available: {}", key);
                Err(e)
            }
        }
    }

    /// The network if reachable (and store the result), otherwise the bucket,
    /// otherwise the cached root document.
    pub async fn network_first(&self, request: &RequestDescriptor, bucket: &BucketName) -> Result<Served> {
        let key = request.cache_key();
        match self.network.fetch(request).await {
            Ok(response) => {
                self.store_behind(bucket, key, &response);
                Ok(Served::new(response, Source::Network))
            }
            Err(e) => {
                debug!("Network failed for {}, falling back to {}", key, bucket);
                if let Some(hit) = self.store.match_in(bucket, &key) {
                    return Ok(Served::new(hit, Source::Cache));
                }
                if let Some(root) = self.root_document() {
                    return Ok(Served::new(root, Source::OfflineFallback));
                }
                Err(e)
            }
        }
    }

    /// Cached `/` from this release's buckets, static first.
    pub fn root_document(&self) -> Option<Response> {
        self.root_buckets
            .iter()
            .find_map(|bucket| self.store.match_in(bucket, &self.root_key))
    }

    /// Store a clone of `response` without making the caller wait.
    fn store_behind(&self, bucket: &BucketName, key: String, response: &Response) {
        let store = self.store.clone();
        let bucket = bucket.clone();
        let copy = response.clone();
        self.writes.schedule(async move {
            // Already-returned responses stay valid
            if let Err(e) = store.put(&bucket, &key, copy).await {
                warn!("Cache write for {} failed: {}", key, e);
            }
        });
    }
}
