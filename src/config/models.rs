//! Configuration data structures for the shellcache proxy.
//!
//! This module defines the schema for the application settings: the listening
//! server, the origin being fronted, the release the coordinator installs,
//! cache persistence, upstream networking and logging.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server settings (host, port).
    #[serde(default)]
    pub server: ServerConfig,

    /// The origin the coordinator controls and the upstream it fronts.
    #[serde(default)]
    pub origin: OriginConfig,

    /// Release identity and lifecycle behaviour.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Cache store persistence.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Upstream HTTP client settings.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the built-in HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The IP address or hostname the server should bind to.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// The port number the server should listen on.
    /// Default: `8080`
    #[serde(default = "default_port")]
    pub port: u16,
}

/// The origin under control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Public URL clients use to reach the proxy. Requests whose origin differs
    /// from this one are passed through untouched.
    /// Default: `http://127.0.0.1:8080`
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Where origin requests are actually served from.
    /// Default: `http://127.0.0.1:3000`
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Forward absolute-form requests for other origins. Off, the proxy
    /// refuses them instead of acting as an open forward proxy.
    /// Default: `false`
    #[serde(default)]
    pub forward_foreign: bool,
}

/// Release identity and lifecycle switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Build-time version identifier; bucket names derive from it.
    /// Default: `v1`
    #[serde(default = "default_version")]
    pub version: String,

    /// Origin-relative path the coordinator is registered at.
    /// Default: `/sw.js`
    #[serde(default = "default_script_path")]
    pub script_path: String,

    /// Core shell paths fetched and stored at install time, in order.
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,

    /// Take control of already-open clients as soon as activation finishes.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub claim_clients: bool,

    /// Skip the waiting phase right after a successful install.
    /// Default: `false`
    #[serde(default)]
    pub skip_waiting_on_install: bool,

    /// Attempts per manifest entry before an install is abandoned.
    /// Default: `3`
    #[serde(default = "default_install_attempts")]
    pub install_attempts: u32,
}

/// Cache store persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Persist buckets to disk so the shell survives restarts.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Directory holding one sub-directory per bucket.
    /// Default: `~/.shellcache/cache`
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

/// Settings for the upstream HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP connect timeout in seconds.
    /// Default: `10`
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Overall request timeout. Unset means requests may block until the
    /// transport gives up.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Maximum number of idle connections to keep per host.
    /// Default: `32`
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default trait implementations linking to custom logic

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            public_url: default_public_url(),
            upstream_url: default_upstream_url(),
            forward_foreign: false,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            script_path: default_script_path(),
            manifest: default_manifest(),
            claim_clients: true,
            skip_waiting_on_install: false,
            install_attempts: default_install_attempts(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            persist: true,
            dir: default_cache_dir(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_connect_timeout(),
            timeout_seconds: None,
            pool_size: default_pool_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Helper functions for serde defaults
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_script_path() -> String {
    "/sw.js".to_string()
}

fn default_manifest() -> Vec<String> {
    ["/", "/index.html", "/manifest.json", "/icon-192.png", "/icon-512.png"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_install_attempts() -> u32 {
    3
}

fn default_cache_dir() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".shellcache")
        .join("cache")
        .to_string_lossy()
        .to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_pool_size() -> usize {
    32
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
