//! Discovery error taxonomy.
//!
//! Only [`TransportError::Bind`] and [`TransportError::Join`] are fatal, and
//! only at startup. Everything the loops hit afterwards is logged and the
//! loop keeps going.

use std::io;
use std::net::Ipv4Addr;
use std::time::Duration;

use beacon_core::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind discovery socket on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to join multicast group {group} on {interface}: {source}")]
    Join {
        group: Ipv4Addr,
        interface: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    #[error("failed to leave multicast group {group}: {source}")]
    Leave {
        group: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    /// No datagram within the receive timeout. Control flow, not a failure.
    #[error("no datagram within {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Transient errors are logged by the loops and never stop them.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Send(_) | TransportError::Receive(_) | TransportError::Timeout(_)
        )
    }
}

/// Errors returned by [`crate::start`].
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
