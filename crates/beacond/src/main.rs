//! beacond: Beacon LAN discovery daemon.
//!
//! Usage: beacond [interface-address]
//!
//! The optional argument pins the multicast interface (an IPv4 address),
//! overriding the config file and BEACON_NETWORK__INTERFACE.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use beacon_core::BeaconConfig;

/// How often the peer table is written to the log.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load config
    match BeaconConfig::write_default_if_missing() {
        Ok(path) => tracing::debug!(path = %path.display(), "config file"),
        Err(e) => tracing::warn!(error = %e, "failed to write default config"),
    }
    let mut config = BeaconConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        BeaconConfig::default()
    });

    if let Some(interface) = std::env::args().nth(1) {
        config.network.interface = interface;
    }

    let discovery_config = config
        .discovery_config()
        .context("invalid discovery configuration")?;

    tracing::info!(
        fingerprint = %discovery_config.local.fingerprint,
        alias = %discovery_config.local.alias,
        "beacond starting"
    );

    let handle = beacon_discovery::start(discovery_config).context("failed to start discovery")?;

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let api_task = {
        let state = beacon_api::ApiState::from_handle(&handle);
        let port = config.network.api_port;
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = beacon_api::serve(state, port, shutdown).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    let peer_printer = {
        let registry = handle.registry().clone();
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SNAPSHOT_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = interval.tick() => {
                        let peers = registry.list();
                        tracing::info!(count = peers.len(), "peer table snapshot");
                        for p in &peers {
                            tracing::info!(
                                fingerprint = %p.announcement.fingerprint,
                                alias = %p.announcement.alias,
                                addr = %p.source,
                                age_secs = p.age().as_secs(),
                                "  peer"
                            );
                        }
                    }
                }
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown signal received");

    let _ = shutdown_tx.send(());
    handle.stop().await;
    for (name, task) in [("api", api_task), ("peer printer", peer_printer)] {
        if let Err(e) = task.await {
            tracing::error!(task = name, error = %e, "task panicked");
        }
    }

    tracing::info!("beacond stopped");
    Ok(())
}
