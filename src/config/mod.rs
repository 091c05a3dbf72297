// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{CoordinatorError, Result};
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

impl AppConfig {
    /// Load configuration from the default config file location.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(&Self::default_config_path()))
    }

    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest; CLI overrides are applied by the caller)
    /// 2. Config file
    /// 3. Defaults (lowest)
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            // Load from config file if it exists
            .add_source(File::from(path).required(false))
            // Override with environment variables (prefix: SHELLCACHE_)
            .add_source(
                Environment::with_prefix("SHELLCACHE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| CoordinatorError::Config(e.to_string()))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| CoordinatorError::Config(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject configurations the coordinator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.coordinator.version.trim().is_empty() {
            return Err(CoordinatorError::Config("coordinator.version must not be empty".into()));
        }
        if let Some(bad) = self.coordinator.manifest.iter().find(|p| !p.starts_with('/')) {
            return Err(CoordinatorError::Config(format!(
                "manifest entry '{}' must be origin-relative",
                bad
            )));
        }
        if !self.coordinator.script_path.starts_with('/') {
            return Err(CoordinatorError::Config(format!(
                "script path '{}' must be origin-relative",
                self.coordinator.script_path
            )));
        }
        for url in [&self.origin.public_url, &self.origin.upstream_url] {
            reqwest::Url::parse(url)
                .map_err(|e| CoordinatorError::Config(format!("invalid URL '{}': {}", url, e)))?;
        }
        Ok(())
    }

    pub fn default_config_path() -> String {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".shellcache")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.coordinator.manifest[0], "/");
        assert!(config.network.timeout_seconds.is_none());
    }

    #[test]
    fn test_relative_manifest_entry_rejected() {
        let mut config = AppConfig::default();
        config.coordinator.manifest.push("index.html".to_string());
        assert!(matches!(config.validate(), Err(CoordinatorError::Config(_))));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[coordinator]\nversion = \"v7\"\nmanifest = [\"/\", \"/app.js\"]\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.coordinator.version, "v7");
        assert_eq!(config.coordinator.manifest, vec!["/", "/app.js"]);
        assert_eq!(config.server.port, 8080);
    }
}
