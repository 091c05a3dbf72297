// Cache store - named, versioned buckets of request/response pairs
// Author: kelexine (https://github.com/kelexine)

use crate::cache::models::{BucketName, CacheStats};
use crate::error::{CoordinatorError, Result};
use crate::lifecycle::Release;
use crate::metrics;
use crate::models::Response;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

type Bucket = HashMap<String, Response>;

/// Release that last activated against this store, kept beside the buckets.
const ACTIVE_RELEASE_FILE: &str = "active-release.json";

/// On-disk form of one entry.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    key: String,
    response: Response,
}

#[derive(Default)]
struct StoreState {
    buckets: HashMap<String, Bucket>,
    /// Versions that have ever owned a bucket here.
    seen_versions: HashSet<String>,
    /// Versions superseded by an activation; writes to them are refused.
    retired: HashSet<String>,
}

/// Bucketed response cache shared by every coordinator of one origin.
///
/// Lookups are served from memory. When opened with a directory, every bucket
/// is mirrored to `<dir>/<bucket>/<sha256(key)>.json` and reloaded on open.
pub struct CacheStore {
    state: RwLock<StoreState>,
    persist_dir: Option<PathBuf>,
    /// Serializes disk mutations so a deletion never interleaves with a write.
    io: tokio::sync::Mutex<()>,
    stats: Mutex<CacheStats>,
    active: RwLock<Option<Release>>,
}

impl CacheStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            persist_dir: None,
            io: tokio::sync::Mutex::new(()),
            stats: Mutex::new(CacheStats::default()),
            active: RwLock::new(None),
        }
    }

    /// Open (or create) a persistent store rooted at `dir`, reloading existing buckets.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let mut state = StoreState::default();
        let mut buckets = tokio::fs::read_dir(&dir).await?;
        while let Some(bucket_dir) = buckets.next_entry().await? {
            if !bucket_dir.file_type().await?.is_dir() {
                continue;
            }
            let name = bucket_dir.file_name().to_string_lossy().to_string();
            let bucket = Self::load_bucket(&bucket_dir.path()).await?;
            debug!("Loaded bucket {} with {} entries", name, bucket.len());
            if let Some(parsed) = BucketName::parse(&name) {
                state.seen_versions.insert(parsed.version);
            }
            state.buckets.insert(name, bucket);
        }

        let active = Self::load_active_release(&dir).await;
        info!(
            "Opened cache store at {} ({} buckets, last active release: {})",
            dir.display(),
            state.buckets.len(),
            active.as_ref().map(|r| r.version.as_str()).unwrap_or("none")
        );

        Ok(Self {
            state: RwLock::new(state),
            persist_dir: Some(dir),
            io: tokio::sync::Mutex::new(()),
            stats: Mutex::new(CacheStats::default()),
            active: RwLock::new(active),
        })
    }

    async fn load_bucket(path: &Path) -> Result<Bucket> {
        let mut bucket = Bucket::new();
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file = entry.path();
            if file.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = tokio::fs::read(&file).await?;
            match serde_json::from_slice::<PersistedEntry>(&contents) {
                Ok(persisted) => {
                    bucket.insert(persisted.key, persisted.response);
                }
                Err(e) => {
                    // A torn write only costs one entry
                    warn!("Skipping unreadable cache entry {}: {}", file.display(), e);
                }
            }
        }
        Ok(bucket)
    }

    async fn load_active_release(dir: &Path) -> Option<Release> {
        let contents = tokio::fs::read(dir.join(ACTIVE_RELEASE_FILE)).await.ok()?;
        match serde_json::from_slice(&contents) {
            Ok(release) => Some(release),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", ACTIVE_RELEASE_FILE, e);
                None
            }
        }
    }

    /// Remember `release` as the one whose buckets this store now holds.
    pub async fn record_active(&self, release: &Release) -> Result<()> {
        *self.active.write() = Some(release.clone());
        if let Some(dir) = &self.persist_dir {
            let _io = self.io.lock().await;
            let contents = serde_json::to_vec(release)?;
            tokio::fs::write(dir.join(ACTIVE_RELEASE_FILE), contents).await?;
        }
        Ok(())
    }

    /// The release recorded by the last activation, if any.
    pub fn active_release(&self) -> Option<Release> {
        self.active.read().clone()
    }

    fn entry_file_name(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{}.json", hex::encode(hasher.finalize()))
    }

    fn bucket_path(&self, name: &str) -> Option<PathBuf> {
        self.persist_dir.as_ref().map(|dir| dir.join(name))
    }

    /// Allow writes for `version` again, e.g. when a release is re-installed.
    pub fn admit(&self, version: &str) {
        let mut state = self.state.write();
        state.retired.remove(version);
        state.seen_versions.insert(version.to_string());
    }

    /// Create the bucket if it does not exist yet.
    pub async fn open_bucket(&self, name: &BucketName) -> Result<()> {
        let _io = self.io.lock().await;
        let key = name.to_string();
        {
            let mut state = self.state.write();
            if state.retired.contains(&name.version) {
                return Err(CoordinatorError::CacheWriteFailure {
                    bucket: key,
                    reason: "version has been retired".to_string(),
                });
            }
            state.seen_versions.insert(name.version.clone());
            state.buckets.entry(key.clone()).or_default();
        }
        if let Some(path) = self.bucket_path(&key) {
            tokio::fs::create_dir_all(path).await?;
        }
        Ok(())
    }

    /// Insert or overwrite the entry for `key`, creating the bucket lazily.
    pub async fn put(&self, name: &BucketName, key: &str, response: Response) -> Result<()> {
        let result = self.put_inner(name, key, response).await;
        let mut stats = self.stats.lock();
        match &result {
            Ok(()) => {
                stats.writes += 1;
                metrics::record_cache_operation("write");
            }
            Err(_) => {
                stats.write_failures += 1;
                metrics::record_cache_operation("write_failure");
            }
        }
        result
    }

    async fn put_inner(&self, name: &BucketName, key: &str, response: Response) -> Result<()> {
        let bucket = name.to_string();
        if !response.is_storable() {
            return Err(CoordinatorError::CacheWriteFailure {
                bucket,
                reason: format!("status {} cannot be stored", response.status),
            });
        }

        let stored = response.stamped();
        let _io = self.io.lock().await;
        {
            let mut state = self.state.write();
            if state.retired.contains(&name.version) {
                return Err(CoordinatorError::CacheWriteFailure {
                    bucket,
                    reason: "version has been retired".to_string(),
                });
            }
            state.seen_versions.insert(name.version.clone());
            state
                .buckets
                .entry(bucket.clone())
                .or_default()
                .insert(key.to_string(), stored.clone());
        }

        if let Some(dir) = self.bucket_path(&bucket) {
            let persisted = PersistedEntry {
                key: key.to_string(),
                response: stored,
            };
            let write = async {
                tokio::fs::create_dir_all(&dir).await?;
                let contents = serde_json::to_vec(&persisted)?;
                tokio::fs::write(dir.join(Self::entry_file_name(key)), contents).await?;
                Ok::<_, CoordinatorError>(())
            };
            write.await.map_err(|e| CoordinatorError::CacheWriteFailure {
                bucket,
                reason: e.to_string(),
            })?;
        }

        debug!("Stored {} in {}", key, name);
        Ok(())
    }

    /// Look `key` up in a single bucket.
    pub fn match_in(&self, name: &BucketName, key: &str) -> Option<Response> {
        let found = self
            .state
            .read()
            .buckets
            .get(&name.to_string())
            .and_then(|bucket| bucket.get(key))
            .cloned();
        self.record_lookup(found.is_some());
        found
    }

    /// Whether `key` is stored in the bucket. Not counted as a lookup.
    pub fn contains(&self, name: &BucketName, key: &str) -> bool {
        self.state
            .read()
            .buckets
            .get(&name.to_string())
            .map(|bucket| bucket.contains_key(key))
            .unwrap_or(false)
    }

    fn record_lookup(&self, hit: bool) {
        let mut stats = self.stats.lock();
        if hit {
            stats.hits += 1;
            metrics::record_cache_operation("hit");
        } else {
            stats.misses += 1;
            metrics::record_cache_operation("miss");
        }
    }

    /// All bucket names, sorted.
    pub fn bucket_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().buckets.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_bucket(&self, name: &BucketName) -> bool {
        self.state.read().buckets.contains_key(&name.to_string())
    }

    /// Every key across every bucket.
    pub fn all_keys(&self) -> Vec<String> {
        let state = self.state.read();
        let mut keys: Vec<String> = state.buckets.values().flat_map(|b| b.keys().cloned()).collect();
        keys.sort();
        keys
    }

    pub fn entry_count(&self, name: &BucketName) -> usize {
        self.state
            .read()
            .buckets
            .get(&name.to_string())
            .map(|b| b.len())
            .unwrap_or(0)
    }

    /// Delete a bucket by its stored name. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let _io = self.io.lock().await;
        let existed = self.state.write().buckets.remove(name).is_some();
        if let Some(path) = self.bucket_path(name) {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if existed {
            self.stats.lock().deletions += 1;
            metrics::record_bucket_deletion();
            debug!("Deleted bucket {}", name);
        }
        Ok(existed)
    }

    /// Retire every version other than `version` and delete their buckets.
    ///
    /// Resolves only after every deletion has finished. Buckets whose names
    /// do not parse are treated as belonging to another version.
    pub async fn retain_version(&self, version: &str) -> Result<Vec<String>> {
        let doomed: Vec<String> = {
            let mut state = self.state.write();
            let stale: Vec<String> = state
                .seen_versions
                .iter()
                .filter(|v| v.as_str() != version)
                .cloned()
                .collect();
            state.retired.extend(stale);
            state.retired.remove(version);
            state
                .buckets
                .keys()
                .filter(|name| {
                    BucketName::parse(name)
                        .map(|parsed| parsed.version != version)
                        .unwrap_or(true)
                })
                .cloned()
                .collect()
        };

        let results = join_all(doomed.iter().map(|name| self.delete(name))).await;
        for (name, result) in doomed.iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to delete bucket {}: {}", name, e);
                return Err(e);
            }
        }

        if !doomed.is_empty() {
            info!("Deleted {} stale bucket(s): {}", doomed.len(), doomed.join(", "));
        }
        Ok(doomed)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }
}
