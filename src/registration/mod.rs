//! Per-origin registration.
//!
//! A [`Registration`] is the single owner of everything one origin needs:
//! the shared cache store, the installing/waiting/active coordinator slots,
//! the open client instances and the lifecycle event broadcast. All install
//! and activate transitions run under one lock, so they are serialized with
//! respect to each other while the active coordinator keeps serving.
//!
//! [`Registrations`] maps origins to registrations and makes repeated
//! registration calls idempotent.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod client;

pub use client::ClientHandle;

use crate::cache::{BucketName, CacheStore};
use crate::config::AppConfig;
use crate::error::{CoordinatorError, Result};
use crate::lifecycle::{Coordinator, LifecycleEvent, LifecycleState, Release};
use crate::metrics;
use crate::models::{RequestDescriptor, Response};
use crate::network::Network;
use parking_lot::{Mutex, RwLock};
use reqwest::Url;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle switches shared by every release of an origin.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Control already-open clients right after activation.
    pub claim_clients: bool,
    /// Activate immediately after every successful install.
    pub skip_waiting_on_install: bool,
    /// Attempts per manifest entry.
    pub install_attempts: u32,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            claim_clients: true,
            skip_waiting_on_install: false,
            install_attempts: 3,
        }
    }
}

impl From<&AppConfig> for LifecycleSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            claim_clients: config.coordinator.claim_clients,
            skip_waiting_on_install: config.coordinator.skip_waiting_on_install,
            install_attempts: config.coordinator.install_attempts,
        }
    }
}

#[derive(Default)]
struct Slots {
    installing: Option<Arc<Coordinator>>,
    waiting: Option<Arc<Coordinator>>,
    active: Option<Arc<Coordinator>>,
}

/// Open application instance as the registration sees it.
#[derive(Debug, Clone, Default)]
struct ClientState {
    /// Version controlling this client, if any.
    controller: Option<String>,
}

/// Status snapshot, used by the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistrationStatus {
    pub origin: String,
    pub script_path: String,
    pub installing: Option<String>,
    pub waiting: Option<String>,
    pub active: Option<String>,
    pub clients: usize,
    pub buckets: Vec<String>,
}

pub struct Registration {
    origin: Url,
    script_path: RwLock<String>,
    store: Arc<CacheStore>,
    network: Arc<dyn Network>,
    settings: LifecycleSettings,
    slots: RwLock<Slots>,
    transitions: tokio::sync::Mutex<()>,
    clients: Mutex<HashMap<Uuid, ClientState>>,
    events: broadcast::Sender<LifecycleEvent>,
    /// Newest release asked for, retried on navigation while nothing is active.
    desired: RwLock<Option<Release>>,
}

impl Registration {
    pub fn new(
        origin: Url,
        script_path: &str,
        store: Arc<CacheStore>,
        network: Arc<dyn Network>,
        settings: LifecycleSettings,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            origin,
            script_path: RwLock::new(script_path.to_string()),
            store,
            network,
            settings,
            slots: RwLock::new(Slots::default()),
            transitions: tokio::sync::Mutex::new(()),
            clients: Mutex::new(HashMap::new()),
            events,
            desired: RwLock::new(None),
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn script_path(&self) -> String {
        self.script_path.read().clone()
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn active(&self) -> Option<Arc<Coordinator>> {
        self.slots.read().active.clone()
    }

    pub fn waiting(&self) -> Option<Arc<Coordinator>> {
        self.slots.read().waiting.clone()
    }

    pub fn installing(&self) -> Option<Arc<Coordinator>> {
        self.slots.read().installing.clone()
    }

    /// Version answered to update queries: the active release, or the
    /// newest one that has not activated yet when nothing is active.
    pub fn current_version(&self) -> Option<String> {
        let slots = self.slots.read();
        slots
            .active
            .as_ref()
            .or(slots.waiting.as_ref())
            .or(slots.installing.as_ref())
            .map(|c| c.version().to_string())
    }

    fn find_version(&self, version: &str) -> Option<Arc<Coordinator>> {
        let slots = self.slots.read();
        let found = [&slots.active, &slots.waiting, &slots.installing]
            .into_iter()
            .flatten()
            .find(|c| c.version() == version)
            .cloned();
        found
    }

    /// Install `release` as a new candidate unless it is already known.
    ///
    /// A failed install leaves the active coordinator untouched and returns
    /// the install error; with nothing active, the release recorded by the
    /// last activation is brought back when its shell is still complete. A
    /// successful install ends in `Waiting`, or `Active` when nothing holds
    /// the candidate back.
    pub async fn update(&self, release: Release) -> Result<Arc<Coordinator>> {
        *self.desired.write() = Some(release.clone());
        let _transition = self.transitions.lock().await;

        if let Some(existing) = self.find_version(&release.version) {
            debug!("Release {} already registered, nothing to do", release.version);
            return Ok(existing);
        }

        let candidate = Arc::new(Coordinator::new(
            &self.origin,
            release,
            self.store.clone(),
            self.network.clone(),
            self.events.clone(),
            self.settings.install_attempts,
        )?);
        let version = candidate.version().to_string();
        self.slots.write().installing = Some(candidate.clone());
        let _ = self.events.send(LifecycleEvent::UpdateFound {
            version: version.clone(),
        });
        metrics::record_transition(LifecycleState::Installing.as_str());

        let persisted = candidate.has_complete_shell();
        match candidate.install().await {
            Ok(_) => {}
            Err(e) if persisted => {
                warn!("Install of {} failed ({}), reusing the persisted shell", version, e);
            }
            Err(e) => {
                warn!("Install of {} abandoned: {}", version, e);
                metrics::record_install(false);
                self.slots.write().installing = None;
                candidate.transition(LifecycleState::Redundant)?;
                // Nothing else owns this version, drop whatever it wrote
                for bucket in [BucketName::static_for(&version), BucketName::dynamic_for(&version)] {
                    if let Err(cleanup) = self.store.delete(&bucket.to_string()).await {
                        warn!("Failed to discard {}: {}", bucket, cleanup);
                    }
                }
                self.restore_recorded_locked().await;
                return Err(e);
            }
        }
        metrics::record_install(true);

        {
            let mut slots = self.slots.write();
            slots.installing = None;
            if let Some(superseded) = slots.waiting.replace(candidate.clone()) {
                info!("{} replaces waiting release {}", version, superseded.version());
                let _ = superseded.transition(LifecycleState::Redundant);
            }
        }
        candidate.transition(LifecycleState::Waiting)?;

        let held_back = self.active().is_some() && self.controlled_clients() > 0;
        if self.settings.skip_waiting_on_install || !held_back {
            self.activate_locked(candidate.clone()).await?;
        } else {
            info!("{} installed and waiting for open clients to close", version);
        }
        Ok(candidate)
    }

    /// Re-activate the release recorded by the last activation. Callers hold
    /// the transition lock.
    async fn restore_recorded_locked(&self) -> Option<Arc<Coordinator>> {
        if self.active().is_some() {
            return None;
        }
        let release = self.store.active_release()?;
        if self.find_version(&release.version).is_some() {
            return None;
        }

        let coordinator = match Coordinator::new(
            &self.origin,
            release,
            self.store.clone(),
            self.network.clone(),
            self.events.clone(),
            self.settings.install_attempts,
        ) {
            Ok(coordinator) => Arc::new(coordinator),
            Err(e) => {
                warn!("Recorded release is unusable: {}", e);
                return None;
            }
        };
        let version = coordinator.version().to_string();
        if !coordinator.has_complete_shell() {
            info!("Recorded release {} has an incomplete shell, staying uncontrolled", version);
            return None;
        }

        info!("Falling back to recorded release {}", version);
        self.store.admit(&version);
        let restored = async {
            coordinator.transition(LifecycleState::Waiting)?;
            self.activate_locked(coordinator.clone()).await
        };
        match restored.await {
            Ok(()) => Some(coordinator),
            Err(e) => {
                warn!("Restoring {} failed: {}", version, e);
                None
            }
        }
    }

    /// Promote the waiting coordinator, if any, without waiting for clients.
    ///
    /// Idempotent: returns `None` when nothing is waiting.
    pub async fn skip_waiting(&self) -> Result<Option<Arc<Coordinator>>> {
        let _transition = self.transitions.lock().await;
        let Some(waiting) = self.waiting() else {
            debug!("skip waiting: nothing is waiting");
            return Ok(None);
        };
        self.activate_locked(waiting.clone()).await?;
        Ok(Some(waiting))
    }

    /// Activate `candidate`. Callers hold the transition lock.
    async fn activate_locked(&self, candidate: Arc<Coordinator>) -> Result<()> {
        let version = candidate.version().to_string();
        candidate.transition(LifecycleState::Activating)?;

        let previous = {
            let mut slots = self.slots.write();
            if slots.waiting.as_ref().map(|w| w.id()) == Some(candidate.id()) {
                slots.waiting = None;
            }
            slots.active.replace(candidate.clone())
        };
        if let Some(previous) = previous {
            info!("{} supersedes {}", version, previous.version());
            previous.transition(LifecycleState::Redundant)?;
        }

        // Deletions finish before anyone is told the new release is active
        if let Err(e) = self.store.retain_version(&version).await {
            // Stale versions are already fenced off from writes
            error!("Activation of {} could not delete every stale bucket: {}", version, e);
        }

        candidate.transition(LifecycleState::Active)?;
        metrics::set_active_version(&version);
        if let Err(e) = self.store.record_active(candidate.release()).await {
            warn!("Could not record {} as the active release: {}", version, e);
        }

        let changed = {
            let mut clients = self.clients.lock();
            let mut changed = 0;
            for state in clients.values_mut() {
                if state.controller.is_some() || self.settings.claim_clients {
                    if state.controller.as_deref() != Some(version.as_str()) {
                        changed += 1;
                    }
                    state.controller = Some(version.clone());
                }
            }
            changed
        };
        if changed > 0 {
            info!("{} now controls {} open client(s)", version, changed);
            let _ = self.events.send(LifecycleEvent::ControllerChanged {
                version,
                clients: changed,
            });
        }
        Ok(())
    }

    /// Serve a request through the active coordinator, or straight from the
    /// network when nothing is active yet.
    ///
    /// A navigation while nothing is active first retries the pending
    /// registration, so a failed startup install recovers once the network
    /// is back.
    pub async fn fetch(&self, request: &RequestDescriptor) -> Result<Response> {
        if request.destination.is_navigation() && self.active().is_none() {
            self.retry_registration().await;
        }
        match self.active() {
            Some(coordinator) => coordinator.handle_fetch(request).await,
            None => self.passthrough(request).await,
        }
    }

    async fn retry_registration(&self) {
        let Some(release) = self.desired.read().clone() else {
            return;
        };
        if self.installing().is_some() || self.find_version(&release.version).is_some() {
            return;
        }
        info!("Nothing active, retrying registration of {}", release.version);
        if let Err(e) = self.update(release).await {
            warn!("Registration retry failed: {}", e);
        }
    }

    pub(crate) async fn passthrough(&self, request: &RequestDescriptor) -> Result<Response> {
        let started = Instant::now();
        let result = self.network.fetch(request).await;
        let source = if result.is_ok() { "passthrough" } else { "failed" };
        metrics::record_fetch("uncontrolled", source, started.elapsed().as_secs_f64());
        result
    }

    /// Open a client instance. It is controlled when a release is active.
    pub fn open_client(self: &Arc<Self>) -> ClientHandle {
        let id = Uuid::new_v4();
        let controller = self.active().map(|c| c.version().to_string());
        debug!("Client {} opened (controller: {:?})", id, controller);
        self.clients.lock().insert(id, ClientState { controller });
        ClientHandle::new(id, self.clone())
    }

    pub(crate) fn controller_of(&self, client: Uuid) -> Option<String> {
        self.clients.lock().get(&client).and_then(|c| c.controller.clone())
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    fn controlled_clients(&self) -> usize {
        self.clients
            .lock()
            .values()
            .filter(|c| c.controller.is_some())
            .count()
    }

    /// Forget a closed client; promote the waiting release once nothing
    /// is controlled by the old one any more.
    pub(crate) fn close_client(self: &Arc<Self>, client: Uuid) {
        self.clients.lock().remove(&client);
        debug!("Client {} closed", client);

        if self.waiting().is_none() || self.controlled_clients() > 0 {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let registration = self.clone();
                runtime.spawn(async move {
                    if let Err(e) = registration.skip_waiting().await {
                        warn!("Promoting waiting release failed: {}", e);
                    }
                });
            }
            Err(_) => debug!("No runtime to promote the waiting release from"),
        }
    }

    /// Wait for background cache writes of the active coordinator.
    pub async fn settle(&self) {
        if let Some(active) = self.active() {
            active.settle().await;
        }
    }

    pub fn status(&self) -> RegistrationStatus {
        let slots = self.slots.read();
        let version = |slot: &Option<Arc<Coordinator>>| slot.as_ref().map(|c| c.version().to_string());
        RegistrationStatus {
            origin: self.origin.origin().ascii_serialization(),
            script_path: self.script_path(),
            installing: version(&slots.installing),
            waiting: version(&slots.waiting),
            active: version(&slots.active),
            clients: self.client_count(),
            buckets: self.store.bucket_names(),
        }
    }
}

/// Where each origin's cache store lives.
#[derive(Debug, Clone)]
pub enum StoreLocation {
    Memory,
    /// One sub-directory per origin under this root.
    Disk(PathBuf),
}

impl StoreLocation {
    pub fn from_config(config: &AppConfig) -> Self {
        if config.cache.persist {
            StoreLocation::Disk(PathBuf::from(&config.cache.dir))
        } else {
            StoreLocation::Memory
        }
    }

    async fn open(&self, origin: &Url) -> Result<CacheStore> {
        match self {
            StoreLocation::Memory => Ok(CacheStore::in_memory()),
            StoreLocation::Disk(root) => {
                let dir: String = origin
                    .origin()
                    .ascii_serialization()
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                    .collect();
                CacheStore::open(root.join(dir)).await
            }
        }
    }
}

/// Origin → registration table.
pub struct Registrations {
    entries: tokio::sync::Mutex<HashMap<String, Arc<Registration>>>,
    network: Arc<dyn Network>,
    settings: LifecycleSettings,
    location: StoreLocation,
}

impl Registrations {
    pub fn new(network: Arc<dyn Network>, settings: LifecycleSettings, location: StoreLocation) -> Self {
        Self {
            entries: tokio::sync::Mutex::new(HashMap::new()),
            network,
            settings,
            location,
        }
    }

    /// Register `release` for `origin` at `script_path`.
    ///
    /// Idempotent: registering the same release again returns the existing
    /// registration without reinstalling anything.
    pub async fn register(&self, origin: &str, script_path: &str, release: Release) -> Result<Arc<Registration>> {
        if !script_path.starts_with('/') {
            return Err(CoordinatorError::InvalidRequest(format!(
                "script path '{}' must be origin-relative",
                script_path
            )));
        }
        let origin = Url::parse(origin)
            .map_err(|e| CoordinatorError::InvalidRequest(format!("invalid origin '{}': {}", origin, e)))?;
        let key = origin.origin().ascii_serialization();

        let registration = {
            let mut entries = self.entries.lock().await;
            match entries.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    info!("Registering coordinator for {} at {}", key, script_path);
                    let store = Arc::new(self.location.open(&origin).await?);
                    let created = Registration::new(
                        origin.clone(),
                        script_path,
                        store,
                        self.network.clone(),
                        self.settings.clone(),
                    );
                    entries.insert(key.clone(), created.clone());
                    created
                }
            }
        };

        {
            let mut current = registration.script_path.write();
            if *current != script_path {
                info!("{}: script path changed {} -> {}", key, current, script_path);
                *current = script_path.to_string();
            }
        }

        registration.update(release).await?;
        Ok(registration)
    }

    pub async fn get(&self, origin: &str) -> Option<Arc<Registration>> {
        let key = Url::parse(origin).ok()?.origin().ascii_serialization();
        self.entries.lock().await.get(&key).cloned()
    }
}
