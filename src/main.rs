// shellcache - offline-first caching proxy for a single-page web app
// Author: kelexine (https://github.com/kelexine)

use anyhow::{Context, Result};
use clap::Parser;
use shellcache::cli::Args;
use shellcache::config::AppConfig;
use shellcache::lifecycle::Release;
use shellcache::network::HttpNetwork;
use shellcache::registration::{LifecycleSettings, Registrations, StoreLocation};
use shellcache::server::create_router;
use shellcache::utils::logging;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    args.apply(&mut config);
    config.validate()?;

    if args.print_config {
        print!("{}", toml::to_string_pretty(&config).context("Failed to render configuration")?);
        return Ok(());
    }

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting shellcache v{}", env!("CARGO_PKG_VERSION"));

    // Phase 3: Upstream network and registration table
    let network = Arc::new(HttpNetwork::new(&config.network, &config.origin)?);
    let registrations = Registrations::new(
        network,
        LifecycleSettings::from(&config),
        StoreLocation::from_config(&config),
    );

    // Phase 4: Register and install the configured release
    let release = Release {
        version: config.coordinator.version.clone(),
        manifest: config.coordinator.manifest.clone(),
    };
    info!(
        "Registering release {} for {} ({} manifest entries)",
        release.version,
        config.origin.public_url,
        release.manifest.len()
    );
    let registration = match registrations
        .register(&config.origin.public_url, &config.coordinator.script_path, release)
        .await
    {
        Ok(registration) => registration,
        Err(e) => {
            // Requests pass straight to the upstream; the next navigation or
            // a POST to the register endpoint retries the install
            warn!("Install failed, serving uncontrolled: {}", e);
            registrations
                .get(&config.origin.public_url)
                .await
                .context("Registration missing after failed install")?
        }
    };

    // Phase 5: Build and start HTTP server
    let app = create_router(config.clone(), registration.clone());
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 6: Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Phase 7: Flush background cache writes
    registration.settle().await;
    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
