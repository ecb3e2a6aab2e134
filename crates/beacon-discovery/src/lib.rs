//! beacon-discovery: LAN presence over UDP multicast.
//!
//! [`start`] joins the group and runs three tasks on the current tokio
//! runtime: an announce loop that advertises the local device, a listen
//! loop that feeds the [`PeerRegistry`], and an expiry loop that prunes
//! peers that went quiet. The returned [`DiscoveryHandle`] is the only way
//! to reach them.

pub mod announce;
pub mod error;
pub mod handle;
pub mod listener;
pub mod registry;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use announce::{AnnounceState, DEGRADED_AFTER_FAILURES};
pub use error::{DiscoveryError, TransportError};
pub use handle::{start, start_with_transport, DiscoveryHandle};
pub use registry::{PeerRecord, PeerRegistry};
pub use transport::{DiscoveryTransport, MulticastTransport, TransportOptions};
