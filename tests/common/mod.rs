// Shared fixtures for integration tests
// Author: kelexine (https://github.com/kelexine)

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use shellcache::cache::CacheStore;
use shellcache::error::{CoordinatorError, Result};
use shellcache::models::{Destination, RequestDescriptor, Response};
use shellcache::network::Network;
use shellcache::registration::{LifecycleSettings, Registration};
use std::collections::HashMap;
use std::sync::Arc;

pub const ORIGIN: &str = "http://localhost:8080";

/// Network double answering from a path → response table.
///
/// Unknown paths answer 404. While offline every fetch fails with
/// `NetworkUnavailable`.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Network serving a small app shell.
    pub fn with_shell() -> Arc<Self> {
        let network = Self::new();
        network.serve("/", "<html>shell v1</html>");
        network.serve("/index.html", "<html>shell v1</html>");
        network.serve("/manifest.json", r#"{"name":"Health App"}"#);
        network.serve("/icon-192.png", "png-192");
        network.serve("/icon-512.png", "png-512");
        network
    }

    pub fn serve(&self, path: &str, body: &str) {
        self.routes.lock().insert(path.to_string(), Response::ok(body.to_string()));
    }

    pub fn respond(&self, path: &str, response: Response) {
        self.routes.lock().insert(path.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    /// Every URL fetched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|url| Url::parse(url).map(|u| u.path() == path).unwrap_or(false))
            .count()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<Response> {
        self.calls.lock().push(request.url.to_string());
        if *self.offline.lock() {
            return Err(CoordinatorError::NetworkUnavailable(format!(
                "{} unreachable",
                request.url
            )));
        }
        Ok(self
            .routes
            .lock()
            .get(request.path())
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}

pub fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

/// Settings that fail fast instead of backing off.
pub fn fast_settings() -> LifecycleSettings {
    LifecycleSettings {
        install_attempts: 1,
        ..LifecycleSettings::default()
    }
}

pub fn registration(network: Arc<ScriptedNetwork>) -> Arc<Registration> {
    Registration::new(
        origin(),
        "/sw.js",
        Arc::new(CacheStore::in_memory()),
        network,
        fast_settings(),
    )
}

pub fn get(path: &str, destination: Destination) -> RequestDescriptor {
    RequestDescriptor::get(&format!("{}{}", ORIGIN, path), destination).unwrap()
}
