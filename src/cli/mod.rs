// CLI module for shellcache
// Author: kelexine (https://github.com/kelexine)

use crate::config::AppConfig;
use clap::Parser;
use std::path::PathBuf;

/// shellcache - offline-first caching proxy for a single-page web app
#[derive(Parser, Debug, Default)]
#[command(name = "shellcache", version, about, long_about = None)]
pub struct Args {
    /// Config file (default: ~/.shellcache/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Port to listen on, overriding the config file
    #[arg(long)]
    pub port: Option<u16>,

    /// Release version to install, overriding the config file
    #[arg(long = "release-version", value_name = "VERSION")]
    pub release_version: Option<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(version) = &self.release_version {
            config.coordinator.version = version.clone();
        }
    }
}
