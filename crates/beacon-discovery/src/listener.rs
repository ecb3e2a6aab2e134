//! Announcement listener and registry expiry.
//!
//! The listen loop receives datagrams with a timeout, parses each one as a
//! [`PeerAnnouncement`] and applies it to the registry. A bad datagram costs
//! exactly one iteration: it is logged at debug and dropped. A separate
//! expiry loop prunes peers that have gone quiet, so a listen-only client
//! still forgets peers that vanish without a departure.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tokio::time::{self, Instant, MissedTickBehavior};

use beacon_core::wire::MAX_DATAGRAM;
use beacon_core::PeerAnnouncement;

use crate::error::TransportError;
use crate::registry::{PeerRecord, PeerRegistry};
use crate::transport::DiscoveryTransport;

/// What a single datagram did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Presence recorded. `new` if the peer was not known before.
    Upserted { new: bool },
    /// Explicit departure. `removed` if the peer was known.
    Departed { removed: bool },
    /// Our own announcement looped back.
    OwnAnnouncement,
    /// Not a valid announcement.
    Discarded,
}

/// Apply one received datagram to the registry.
pub fn handle_datagram(
    registry: &PeerRegistry,
    local_fingerprint: &str,
    data: &[u8],
    source: SocketAddr,
) -> Outcome {
    let announcement = match PeerAnnouncement::from_datagram(data) {
        Ok(a) => a,
        Err(e) => {
            tracing::debug!(error = %e, source = %source, len = data.len(), "discarding datagram");
            return Outcome::Discarded;
        }
    };

    if announcement.fingerprint == local_fingerprint {
        tracing::trace!("ignoring own announcement");
        return Outcome::OwnAnnouncement;
    }

    if !announcement.announce {
        let removed = registry.remove(&announcement.fingerprint).is_some();
        if removed {
            tracing::info!(
                fingerprint = %announcement.fingerprint,
                alias = %announcement.alias,
                "peer departed"
            );
        }
        return Outcome::Departed { removed };
    }

    let fingerprint = announcement.fingerprint.clone();
    let alias = announcement.alias.clone();
    let new = registry.upsert(PeerRecord::new(announcement, source));
    if new {
        tracing::info!(fingerprint = %fingerprint, alias = %alias, addr = %source, "peer discovered");
    } else {
        tracing::trace!(fingerprint = %fingerprint, "peer refreshed");
    }
    Outcome::Upserted { new }
}

/// Pause after a failed receive so a socket that errors on every call does
/// not spin.
pub const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct ListenLoop<T> {
    transport: Arc<T>,
    registry: PeerRegistry,
    local_fingerprint: String,
    receive_timeout: Duration,
    /// Poked when a new peer shows up, so the announce loop answers early.
    nudge: Option<Arc<Notify>>,
    shutdown: broadcast::Receiver<()>,
}

impl<T: DiscoveryTransport> ListenLoop<T> {
    pub fn new(
        transport: Arc<T>,
        registry: PeerRegistry,
        local_fingerprint: String,
        receive_timeout: Duration,
        nudge: Option<Arc<Notify>>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            transport,
            registry,
            local_fingerprint,
            receive_timeout,
            nudge,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires. Never fails: receive errors and
    /// bad datagrams are logged and skipped.
    pub async fn run(mut self) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut failures: u32 = 0;

        tracing::info!(
            timeout_ms = self.receive_timeout.as_millis() as u64,
            "listen loop starting"
        );

        loop {
            let result = tokio::select! {
                _ = self.shutdown.recv() => break,
                r = self.transport.receive(&mut buf, self.receive_timeout) => r,
            };

            if failures > 0 && !matches!(result, Err(TransportError::Receive(_))) {
                if failures > 1 {
                    tracing::info!(failures, "receive recovered");
                }
                failures = 0;
            }

            match result {
                Ok((len, source)) => {
                    let outcome =
                        handle_datagram(&self.registry, &self.local_fingerprint, &buf[..len], source);
                    if outcome == (Outcome::Upserted { new: true }) {
                        if let Some(nudge) = &self.nudge {
                            nudge.notify_one();
                        }
                    }
                }
                Err(TransportError::Timeout(_)) => {}
                Err(e) => {
                    failures = failures.saturating_add(1);
                    if failures == 1 {
                        tracing::warn!(error = %e, "receive failed");
                    } else {
                        tracing::debug!(error = %e, failures, "receive still failing");
                    }
                    tokio::select! {
                        _ = self.shutdown.recv() => break,
                        _ = time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::info!("listen loop stopped");
    }
}

/// Remove registry entries that have not been refreshed within `ttl`,
/// checking every `interval` until shutdown.
pub async fn expiry_loop(
    registry: PeerRegistry,
    ttl: Duration,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                let removed = registry.sweep_expired(Instant::now(), ttl);
                if removed > 0 {
                    tracing::debug!(removed, remaining = registry.len(), "expired peer registry entries");
                }
            }
        }
    }
}
