//! `start()` and the handle that owns a running discovery instance.

use std::net::SocketAddrV4;
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;

use beacon_core::{DiscoveryConfig, PeerAnnouncement};

use crate::announce::{AnnounceLoop, AnnounceState};
use crate::error::DiscoveryError;
use crate::listener::{expiry_loop, ListenLoop};
use crate::registry::{PeerRecord, PeerRegistry};
use crate::transport::{DiscoveryTransport, MulticastTransport, TransportOptions};

/// Validate `config`, join the group and spawn the discovery loops.
///
/// Must be called from within a tokio runtime. Bind and join failures are
/// returned here; nothing after startup is fatal.
pub fn start(config: DiscoveryConfig) -> Result<DiscoveryHandle, DiscoveryError> {
    config.validate()?;
    let transport = MulticastTransport::open(TransportOptions::from(&config))?;
    let group = transport.group();
    start_with_transport(Arc::new(transport), group, config)
}

/// Spawn the loops over an already-open transport.
pub fn start_with_transport<T: DiscoveryTransport>(
    transport: Arc<T>,
    group: SocketAddrV4,
    config: DiscoveryConfig,
) -> Result<DiscoveryHandle<T>, DiscoveryError> {
    config.validate()?;
    let registry = PeerRegistry::new();
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks = Vec::with_capacity(3);

    let (state_tx, state_rx) = watch::channel(if config.listen_only {
        AnnounceState::Stopped
    } else {
        AnnounceState::Idle
    });

    let nudge = if config.listen_only {
        None
    } else {
        let nudge = Arc::new(Notify::new());
        let announcer = AnnounceLoop::new(
            transport.clone(),
            config.local.clone(),
            config.announce_interval,
            nudge.clone(),
            state_tx,
            shutdown_tx.subscribe(),
        );
        tasks.push(tokio::spawn(async move {
            if let Err(e) = announcer.run().await {
                tracing::error!(error = %e, "announce loop failed");
            }
        }));
        Some(nudge)
    };

    tasks.push(tokio::spawn(
        ListenLoop::new(
            transport.clone(),
            registry.clone(),
            config.local.fingerprint.clone(),
            config.receive_timeout,
            nudge,
            shutdown_tx.subscribe(),
        )
        .run(),
    ));

    tasks.push(tokio::spawn(expiry_loop(
        registry.clone(),
        config.peer_ttl,
        config.sweep_interval,
        shutdown_tx.subscribe(),
    )));

    tracing::info!(
        fingerprint = %config.local.fingerprint,
        alias = %config.local.alias,
        group = %group,
        listen_only = config.listen_only,
        "discovery started"
    );

    Ok(DiscoveryHandle {
        local: config.local,
        group,
        registry,
        transport,
        state: state_rx,
        shutdown_tx,
        tasks,
    })
}

/// A running discovery instance. Call [`DiscoveryHandle::stop`] to shut it
/// down; dropping the handle signals the loops but does not wait for them.
pub struct DiscoveryHandle<T: DiscoveryTransport = MulticastTransport> {
    local: PeerAnnouncement,
    group: SocketAddrV4,
    registry: PeerRegistry,
    transport: Arc<T>,
    state: watch::Receiver<AnnounceState>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T: DiscoveryTransport> DiscoveryHandle<T> {
    /// Discovered peers, most recently seen first.
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.registry.list()
    }

    /// Shared view of the registry, e.g. for an API server.
    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// The announcement this instance sends.
    pub fn local(&self) -> &PeerAnnouncement {
        &self.local
    }

    pub fn group(&self) -> SocketAddrV4 {
        self.group
    }

    pub fn announce_state(&self) -> AnnounceState {
        *self.state.borrow()
    }

    /// Watch announce state changes.
    pub fn announce_state_receiver(&self) -> watch::Receiver<AnnounceState> {
        self.state.clone()
    }

    /// Signal every loop, wait for all of them to exit, then leave the group.
    pub async fn stop(mut self) {
        tracing::info!("discovery stopping");
        // No receivers left means every loop already exited.
        let _ = self.shutdown_tx.send(());

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "discovery task panicked");
            }
        }

        if let Err(e) = self.transport.close() {
            tracing::warn!(error = %e, "failed to leave discovery group");
        }
        tracing::info!("discovery stopped");
    }
}

impl<T: DiscoveryTransport> Drop for DiscoveryHandle<T> {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            let _ = self.shutdown_tx.send(());
        }
    }
}
