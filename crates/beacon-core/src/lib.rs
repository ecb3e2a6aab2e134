//! beacon-core: shared wire format and configuration.
//! All other Beacon crates depend on this one.

pub mod config;
pub mod wire;

pub use config::{BeaconConfig, ConfigError, DiscoveryConfig};
pub use wire::{DeviceType, PeerAnnouncement, Protocol, WireError};
