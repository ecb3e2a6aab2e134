//! Beacon wire format: the announcement datagram.
//!
//! Every announcement is a single UDP datagram carrying one UTF-8 JSON
//! object. Field names are part of the protocol and are shared with other
//! implementations on the LAN: `fingerprint`, `alias`, `deviceModel`,
//! `deviceType`, `version`, `port`, `protocol`, `download`, `announce`.
//! Unknown fields are ignored so newer peers can extend the payload.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Deserializer, Serialize};

// ── Device type ───────────────────────────────────────────────────────────────

/// What kind of device is announcing itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Desktop,
    Web,
    Headless,
    Server,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Desktop => "desktop",
            DeviceType::Web => "web",
            DeviceType::Headless => "headless",
            DeviceType::Server => "server",
        };
        f.write_str(s)
    }
}

// ── Protocol ──────────────────────────────────────────────────────────────────

/// Scheme the peer's data-transfer server speaks on `port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
        }
    }
}

// ── Announcement ──────────────────────────────────────────────────────────────

/// Presence announcement: what a peer says about itself.
///
/// The same type describes the local device (sent by the announce loop) and
/// remote devices (parsed by the listen loop).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerAnnouncement {
    /// Stable unique peer identifier. The registry key. Must be non-empty.
    pub fingerprint: String,

    /// Human-readable device name.
    pub alias: String,

    pub device_model: String,

    pub device_type: DeviceType,

    /// Protocol version string of the announcing application.
    pub version: String,

    /// Data-transfer port. Never 0.
    pub port: u16,

    pub protocol: Protocol,

    /// Peer serves files for browser download. Some announcers send a path
    /// string here instead of a bool; see [`lenient_flag`].
    #[serde(default, deserialize_with = "lenient_flag")]
    pub download: bool,

    /// `true` = presence, `false` = explicit departure.
    /// Absent on the wire means presence.
    #[serde(default = "default_announce")]
    pub announce: bool,
}

fn default_announce() -> bool {
    true
}

/// Read an optional flag that is not part of the core schema. A bool is taken
/// as is, `null` and `""` mean `false`, and any other value means the peer set
/// it to something, which counts as `true`.
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Null => false,
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    })
}

impl PeerAnnouncement {
    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), WireError> {
        if self.fingerprint.trim().is_empty() {
            return Err(WireError::EmptyFingerprint);
        }
        if self.port == 0 {
            return Err(WireError::InvalidPort(self.port));
        }
        Ok(())
    }

    /// Serialize to the JSON datagram body. Validates first so a bad local
    /// config never reaches the wire.
    pub fn to_datagram(&self) -> Result<Vec<u8>, WireError> {
        self.validate()?;
        serde_json::to_vec(self).map_err(WireError::Serialize)
    }

    /// Parse and validate a received datagram body.
    pub fn from_datagram(bytes: &[u8]) -> Result<Self, WireError> {
        let announcement: PeerAnnouncement =
            serde_json::from_slice(bytes).map_err(WireError::Json)?;
        announcement.validate()?;
        Ok(announcement)
    }

    /// Copy of this announcement flagged as a departure.
    pub fn departure(&self) -> Self {
        Self {
            announce: false,
            ..self.clone()
        }
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// IPv4 multicast group for announcements.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 167);

/// UDP port announcements are sent to and received on.
pub const DISCOVERY_PORT: u16 = 53317;

/// Default announcement interval in seconds.
pub const ANNOUNCE_INTERVAL_SECS: f64 = 5.0;

/// Default peer registry TTL in seconds (three missed announcements).
pub const PEER_TTL_SECS: f64 = 15.0;

/// Default expiry sweep interval in seconds.
pub const SWEEP_INTERVAL_SECS: f64 = 1.0;

/// Default receive timeout. Bounds shutdown latency of the listen loop.
pub const RECEIVE_TIMEOUT_MILLIS: u64 = 500;

/// Default outbound multicast TTL (hops).
pub const MULTICAST_TTL: u32 = 32;

/// Receive buffer size. Larger datagrams are truncated and fail to parse.
pub const MAX_DATAGRAM: usize = 4096;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed announcement: {0}")]
    Json(#[source] serde_json::Error),

    #[error("failed to serialize announcement: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("announcement has an empty fingerprint")]
    EmptyFingerprint,

    #[error("announcement port {0} is out of range 1-65535")]
    InvalidPort(u16),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
