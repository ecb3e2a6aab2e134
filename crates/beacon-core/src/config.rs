//! Configuration system for Beacon.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BEACON_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/beacon/config.toml
//!   3. ~/.config/beacon/config.toml

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::wire::{
    DeviceType, PeerAnnouncement, Protocol, WireError, ANNOUNCE_INTERVAL_SECS, DISCOVERY_PORT,
    MULTICAST_GROUP, MULTICAST_TTL, PEER_TTL_SECS, RECEIVE_TIMEOUT_MILLIS, SWEEP_INTERVAL_SECS,
};

// ── File config ───────────────────────────────────────────────────────────────

/// Top-level configuration, as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub discovery: DiscoveryTiming,
}

/// What this device announces about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Stable peer id. Generated and written to the config file when missing.
    pub fingerprint: String,
    pub alias: String,
    pub device_model: String,
    pub device_type: DeviceType,
    pub version: String,
    /// Data-transfer port advertised to peers (not the discovery port).
    pub port: u16,
    pub protocol: Protocol,
    pub download: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// IPv4 multicast group.
    pub group: Ipv4Addr,
    /// UDP discovery port.
    pub port: u16,
    /// Local interface address to join on. Empty = any interface.
    pub interface: String,
    /// Outbound multicast hop limit.
    pub multicast_ttl: u32,
    /// Port of the local HTTP status API.
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryTiming {
    pub announce_interval_secs: f64,
    /// Peers not heard from within this window are dropped.
    pub peer_ttl_secs: f64,
    pub sweep_interval_secs: f64,
    pub receive_timeout_ms: u64,
    /// Listen without announcing.
    pub listen_only: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Default port of the local HTTP status API.
pub const DEFAULT_API_PORT: u16 = 53318;

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            fingerprint: uuid::Uuid::new_v4().to_string(),
            alias: "beacon".to_string(),
            device_model: std::env::consts::OS.to_string(),
            device_type: DeviceType::Headless,
            version: "2.0".to_string(),
            port: DISCOVERY_PORT,
            protocol: Protocol::Https,
            download: false,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            group: MULTICAST_GROUP,
            port: DISCOVERY_PORT,
            interface: String::new(),
            multicast_ttl: MULTICAST_TTL,
            api_port: DEFAULT_API_PORT,
        }
    }
}

impl Default for DiscoveryTiming {
    fn default() -> Self {
        Self {
            announce_interval_secs: ANNOUNCE_INTERVAL_SECS,
            peer_ttl_secs: PEER_TTL_SECS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
            receive_timeout_ms: RECEIVE_TIMEOUT_MILLIS,
            listen_only: false,
        }
    }
}

// ── Runtime config ────────────────────────────────────────────────────────────

/// Validated settings handed to the discovery subsystem.
///
/// Library callers can build this directly with [`DiscoveryConfig::new`]
/// and override fields; the daemon derives it from [`BeaconConfig`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    /// Interface to join and send on. `None` = wildcard.
    pub interface: Option<Ipv4Addr>,
    pub multicast_ttl: u32,
    pub announce_interval: Duration,
    pub peer_ttl: Duration,
    pub sweep_interval: Duration,
    pub receive_timeout: Duration,
    pub listen_only: bool,
    pub local: PeerAnnouncement,
}

impl DiscoveryConfig {
    /// Defaults for everything but the local announcement.
    pub fn new(local: PeerAnnouncement) -> Self {
        Self {
            group: MULTICAST_GROUP,
            port: DISCOVERY_PORT,
            interface: None,
            multicast_ttl: MULTICAST_TTL,
            announce_interval: Duration::from_secs_f64(ANNOUNCE_INTERVAL_SECS),
            peer_ttl: Duration::from_secs_f64(PEER_TTL_SECS),
            sweep_interval: Duration::from_secs_f64(SWEEP_INTERVAL_SECS),
            receive_timeout: Duration::from_millis(RECEIVE_TIMEOUT_MILLIS),
            listen_only: false,
            local,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.group.is_multicast() {
            return Err(ConfigError::Invalid(format!(
                "group {} is not an IPv4 multicast address",
                self.group
            )));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("discovery port must be non-zero".into()));
        }
        for (name, d) in [
            ("announce interval", self.announce_interval),
            ("peer ttl", self.peer_ttl),
            ("sweep interval", self.sweep_interval),
            ("receive timeout", self.receive_timeout),
        ] {
            if d.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.peer_ttl <= self.announce_interval {
            return Err(ConfigError::Invalid(format!(
                "peer ttl ({:?}) must exceed the announce interval ({:?})",
                self.peer_ttl, self.announce_interval
            )));
        }
        self.local.validate().map_err(ConfigError::Announcement)?;
        Ok(())
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("beacon")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn secs(name: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigError::Invalid(format!("{name} must be a non-negative number, got {value}")))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid local announcement: {0}")]
    Announcement(WireError),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BeaconConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific file without env overrides. Missing file = defaults.
    ///
    /// A file without `identity.fingerprint` gets a generated one written
    /// back, so the id is stable from then on.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(BeaconConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let table: toml::Table = toml::from_str(&text)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        let config: BeaconConfig = toml::from_str(&text)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;

        let has_fingerprint = table
            .get("identity")
            .and_then(|identity| identity.get("fingerprint"))
            .is_some();
        if !has_fingerprint {
            config.save_to(path)?;
        }
        Ok(config)
    }

    /// Write this config to `path`, replacing any existing file.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BEACON_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    /// Write a default config to `path` unless one is already there.
    /// The generated fingerprint is persisted so identity survives restarts.
    pub fn write_default_to(path: &std::path::Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        BeaconConfig::default().save_to(path)
    }

    /// Apply BEACON_* overrides. `lookup` is `std::env::var` in production.
    /// Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("BEACON_IDENTITY__ALIAS") {
            self.identity.alias = v;
        }
        if let Some(v) = lookup("BEACON_IDENTITY__FINGERPRINT") {
            self.identity.fingerprint = v;
        }
        if let Some(Ok(g)) = lookup("BEACON_NETWORK__GROUP").map(|v| v.parse()) {
            self.network.group = g;
        }
        if let Some(Ok(p)) = lookup("BEACON_NETWORK__PORT").map(|v| v.parse()) {
            self.network.port = p;
        }
        if let Some(v) = lookup("BEACON_NETWORK__INTERFACE") {
            self.network.interface = v;
        }
        if let Some(Ok(p)) = lookup("BEACON_NETWORK__API_PORT").map(|v| v.parse()) {
            self.network.api_port = p;
        }
        if let Some(Ok(s)) = lookup("BEACON_DISCOVERY__ANNOUNCE_INTERVAL_SECS").map(|v| v.parse()) {
            self.discovery.announce_interval_secs = s;
        }
        if let Some(Ok(s)) = lookup("BEACON_DISCOVERY__PEER_TTL_SECS").map(|v| v.parse()) {
            self.discovery.peer_ttl_secs = s;
        }
        if let Some(v) = lookup("BEACON_DISCOVERY__LISTEN_ONLY") {
            self.discovery.listen_only = v == "true" || v == "1";
        }
    }

    /// The announcement this device sends.
    pub fn local_announcement(&self) -> PeerAnnouncement {
        let id = &self.identity;
        PeerAnnouncement {
            fingerprint: id.fingerprint.clone(),
            alias: id.alias.clone(),
            device_model: id.device_model.clone(),
            device_type: id.device_type,
            version: id.version.clone(),
            port: id.port,
            protocol: id.protocol,
            download: id.download,
            announce: true,
        }
    }

    /// Convert to a validated runtime [`DiscoveryConfig`].
    pub fn discovery_config(&self) -> Result<DiscoveryConfig, ConfigError> {
        let interface = match self.network.interface.trim() {
            "" => None,
            addr => Some(addr.parse::<Ipv4Addr>().map_err(|_| {
                ConfigError::Invalid(format!("interface '{addr}' is not an IPv4 address"))
            })?),
        };
        let timing = &self.discovery;
        let config = DiscoveryConfig {
            group: self.network.group,
            port: self.network.port,
            interface,
            multicast_ttl: self.network.multicast_ttl,
            announce_interval: secs("announce_interval_secs", timing.announce_interval_secs)?,
            peer_ttl: secs("peer_ttl_secs", timing.peer_ttl_secs)?,
            sweep_interval: secs("sweep_interval_secs", timing.sweep_interval_secs)?,
            receive_timeout: Duration::from_millis(timing.receive_timeout_ms),
            listen_only: timing.listen_only,
            local: self.local_announcement(),
        };
        config.validate()?;
        Ok(config)
    }
}
