//! Presence announcement loop.
//!
//! Sends the local announcement to the group every interval, and once more
//! whenever the listen loop reports a newcomer. On shutdown it sends a
//! final departure (`announce: false`) so peers drop us without waiting
//! for expiry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, Notify};
use tokio::time::{self, MissedTickBehavior};

use beacon_core::{PeerAnnouncement, WireError};

use crate::transport::DiscoveryTransport;

/// Consecutive send failures before the loop reports itself degraded.
pub const DEGRADED_AFTER_FAILURES: u32 = 3;

/// Observable state of the announce loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceState {
    /// Waiting for the next tick.
    Idle,
    /// A send is in flight.
    Announcing,
    /// The last [`DEGRADED_AFTER_FAILURES`] or more sends failed. Still running.
    Degraded,
    /// Loop has exited, or was never started (listen-only).
    Stopped,
}

impl fmt::Display for AnnounceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnnounceState::Idle => "idle",
            AnnounceState::Announcing => "announcing",
            AnnounceState::Degraded => "degraded",
            AnnounceState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

pub struct AnnounceLoop<T> {
    transport: Arc<T>,
    local: PeerAnnouncement,
    interval: Duration,
    nudge: Arc<Notify>,
    state: watch::Sender<AnnounceState>,
    shutdown: broadcast::Receiver<()>,
}

impl<T: DiscoveryTransport> AnnounceLoop<T> {
    pub fn new(
        transport: Arc<T>,
        local: PeerAnnouncement,
        interval: Duration,
        nudge: Arc<Notify>,
        state: watch::Sender<AnnounceState>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            transport,
            local,
            interval,
            nudge,
            state,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires (or its sender is dropped).
    ///
    /// Fails only if the local announcement cannot be serialized, before
    /// anything is sent.
    pub async fn run(mut self) -> Result<(), WireError> {
        let payload = match self.local.to_datagram() {
            Ok(p) => p,
            Err(e) => {
                self.state.send_replace(AnnounceState::Stopped);
                return Err(e);
            }
        };

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        tracing::info!(
            fingerprint = %self.local.fingerprint,
            interval_ms = self.interval.as_millis() as u64,
            "announce loop starting"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => break,
                _ = ticker.tick() => {}
                _ = self.nudge.notified() => {
                    tracing::debug!("announcing early for new peer");
                }
            }

            self.state.send_replace(AnnounceState::Announcing);
            match self.transport.send(&payload).await {
                Ok(()) => {
                    if failures >= DEGRADED_AFTER_FAILURES {
                        tracing::info!(failures, "announcements recovered");
                    }
                    failures = 0;
                    self.state.send_replace(AnnounceState::Idle);
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    tracing::warn!(error = %e, failures, "announcement send failed");
                    if failures >= DEGRADED_AFTER_FAILURES {
                        if failures == DEGRADED_AFTER_FAILURES {
                            tracing::warn!(failures, "announce loop degraded, still retrying");
                        }
                        self.state.send_replace(AnnounceState::Degraded);
                    } else {
                        self.state.send_replace(AnnounceState::Idle);
                    }
                }
            }
        }

        self.send_departure().await;
        self.state.send_replace(AnnounceState::Stopped);
        tracing::info!("announce loop stopped");
        Ok(())
    }

    async fn send_departure(&self) {
        let departure = match self.local.departure().to_datagram() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode departure");
                return;
            }
        };
        match self.transport.send(&departure).await {
            Ok(()) => tracing::debug!("departure sent"),
            Err(e) => tracing::warn!(error = %e, "departure send failed"),
        }
    }
}
