// Coordinator - one release of the offline cache coordinator
// Author: kelexine (https://github.com/kelexine)

use super::{LifecycleEvent, LifecycleState, Release};
use crate::cache::{BucketName, CacheStore};
use crate::classifier::{Classifier, Route};
use crate::error::{CoordinatorError, Result};
use crate::metrics;
use crate::models::{Destination, RequestDescriptor, Response};
use crate::network::Network;
use crate::strategy::{StrategyEngine, WriteBehind};
use crate::utils::retry::{with_retry, TRANSPORT_FAILURE};
use futures::future::try_join_all;
use reqwest::Url;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};
use uuid::Uuid;

/// One release of the coordinator, bound to an origin.
///
/// Owns its lifecycle state, its classifier and its strategy engine. The
/// cache store and the network are shared with every other release of the
/// same origin.
pub struct Coordinator {
    id: Uuid,
    release: Release,
    origin: Url,
    store: Arc<CacheStore>,
    network: Arc<dyn Network>,
    classifier: Classifier,
    engine: StrategyEngine,
    writes: Arc<WriteBehind>,
    state: watch::Sender<LifecycleState>,
    events: broadcast::Sender<LifecycleEvent>,
    install_attempts: u32,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("id", &self.id)
            .field("version", &self.release.version)
            .field("origin", &self.origin.as_str())
            .field("state", &self.state())
            .finish()
    }
}

impl Coordinator {
    /// Create a coordinator in the `Installing` state.
    pub fn new(
        origin: &Url,
        release: Release,
        store: Arc<CacheStore>,
        network: Arc<dyn Network>,
        events: broadcast::Sender<LifecycleEvent>,
        install_attempts: u32,
    ) -> Result<Self> {
        let writes = Arc::new(WriteBehind::new());
        let engine = StrategyEngine::new(
            origin,
            &release.version,
            store.clone(),
            network.clone(),
            writes.clone(),
        )?;
        let classifier = Classifier::new(
            &origin.origin().ascii_serialization(),
            &release.version,
            &release.manifest,
        );
        let (state, _) = watch::channel(LifecycleState::Installing);

        Ok(Self {
            id: Uuid::new_v4(),
            release,
            origin: origin.clone(),
            store,
            network,
            classifier,
            engine,
            writes,
            state,
            events,
            install_attempts,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The version identifier, as answered to update queries.
    pub fn version(&self) -> &str {
        &self.release.version
    }

    pub fn release(&self) -> &Release {
        &self.release
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Move to `next`, rejecting moves the lifecycle does not allow.
    pub(crate) fn transition(&self, next: LifecycleState) -> Result<()> {
        let current = self.state();
        if current == next {
            return Ok(());
        }
        if !current.can_transition_to(next) {
            return Err(CoordinatorError::Internal(format!(
                "{}: illegal transition {} -> {}",
                self.release.version,
                current.as_str(),
                next.as_str()
            )));
        }

        self.state.send_replace(next);
        info!(
            "Coordinator {} ({}) is now {}",
            self.release.version,
            self.id,
            next.as_str()
        );
        metrics::record_transition(next.as_str());
        // Nobody listening is fine
        let _ = self.events.send(LifecycleEvent::StateChanged {
            version: self.release.version.clone(),
            state: next,
        });
        Ok(())
    }

    /// Fetch every manifest path and store the results in `static-<version>`.
    ///
    /// All-or-nothing: nothing is written unless every entry was fetched
    /// with a 2xx status. Returns the number of stored entries.
    pub async fn install(&self) -> Result<usize> {
        let version = &self.release.version;
        info!(
            "Installing {}: caching {} core shell entries",
            version,
            self.release.manifest.len()
        );
        self.store.admit(version);

        let fetched = try_join_all(
            self.release
                .manifest
                .iter()
                .map(|path| self.fetch_manifest_entry(path)),
        )
        .await?;

        let bucket = BucketName::static_for(version);
        self.store.open_bucket(&bucket).await?;
        for (key, response) in &fetched {
            self.store.put(&bucket, key, response.clone()).await?;
        }

        info!("Installed {} ({} entries in {})", version, fetched.len(), bucket);
        Ok(fetched.len())
    }

    /// Whether `static-<version>` already holds every manifest entry, as
    /// after a restart on a persisted store.
    pub fn has_complete_shell(&self) -> bool {
        let bucket = BucketName::static_for(&self.release.version);
        self.release.manifest.iter().all(|path| {
            RequestDescriptor::for_path(&self.origin, path, Destination::Empty)
                .map(|request| self.store.contains(&bucket, &request.cache_key()))
                .unwrap_or(false)
        })
    }

    async fn fetch_manifest_entry(&self, path: &str) -> Result<(String, Response)> {
        let request = RequestDescriptor::for_path(&self.origin, path, Destination::Empty)?;
        let operation = format!("Install {} {}", self.release.version, path);

        let response = with_retry(&operation, self.install_attempts, || {
            let network = self.network.clone();
            let request = request.clone();
            async move {
                match network.fetch(&request).await {
                    Ok(response) if response.is_ok() => Ok(response),
                    Ok(response) => Err((response.status, format!("HTTP {}", response.status))),
                    Err(e) => Err((TRANSPORT_FAILURE, e.to_string())),
                }
            }
        })
        .await
        .map_err(|(_, reason)| CoordinatorError::ManifestFetchFailed {
            path: path.to_string(),
            reason,
        })?;

        Ok((request.cache_key(), response))
    }

    /// Resolve once the coordinator is no longer mid-activation.
    pub async fn ready(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s != LifecycleState::Activating).await;
    }

    /// Handle one intercepted request.
    ///
    /// `Err(NetworkUnavailable)` means no response exists: the network failed
    /// and no cached entry or offline fallback applied.
    pub async fn handle_fetch(&self, request: &RequestDescriptor) -> Result<Response> {
        self.ready().await;
        let started = Instant::now();

        match self.classifier.classify(request) {
            Route::Passthrough => {
                debug!("Passing through {} {}", request.method, request.url);
                let result = self.network.fetch(request).await;
                let source = if result.is_ok() { "passthrough" } else { "failed" };
                metrics::record_fetch("unclassified", source, started.elapsed().as_secs_f64());
                result
            }
            Route::Handle {
                class,
                strategy,
                bucket,
            } => {
                debug!(
                    "{} classified as {} ({:?} on {})",
                    request.url,
                    class.as_str(),
                    strategy,
                    bucket
                );
                let result = self.engine.execute(strategy, request, &bucket).await;
                let source = match &result {
                    Ok(served) => served.source.as_str(),
                    Err(_) => "failed",
                };
                metrics::record_fetch(class.as_str(), source, started.elapsed().as_secs_f64());
                result.map(|served| served.response)
            }
        }
    }

    /// Wait for every background cache write scheduled so far.
    pub async fn settle(&self) {
        self.writes.drain().await;
    }
}
