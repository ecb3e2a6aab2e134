//! Beacon integration test harness.
//!
//! Tests in this file run real multicast sockets over the loopback
//! interface (127.0.0.1). Each test takes its own discovery port so tests
//! can run in parallel without hearing each other.
//!
//!   cargo test --test integration
//!
//! Tests skip gracefully when the host cannot loop multicast back to
//! itself (e.g. a sandbox without multicast routing).

mod discovery;

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};

use beacon_core::wire::MULTICAST_GROUP;
use beacon_core::{DeviceType, DiscoveryConfig, PeerAnnouncement};

// ── Harness ───────────────────────────────────────────────────────────────────

pub const LOOPBACK: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Announce interval used by every test.
pub const INTERVAL: Duration = Duration::from_millis(200);

static NEXT_PORT: AtomicU16 = AtomicU16::new(0);

/// A discovery port no other test in this run uses.
pub fn next_port() -> u16 {
    let base = 41_000 + (std::process::id() % 1_500) as u16 * 16;
    base + NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

pub fn announcement(fingerprint: &str) -> PeerAnnouncement {
    PeerAnnouncement {
        fingerprint: fingerprint.to_string(),
        alias: format!("it-{fingerprint}"),
        device_model: "integration".to_string(),
        device_type: DeviceType::Server,
        version: "2.0".to_string(),
        port: 53317,
        protocol: beacon_core::Protocol::Http,
        download: false,
        announce: true,
    }
}

/// Fast-cycling config pinned to loopback.
pub fn config(fingerprint: &str, port: u16) -> DiscoveryConfig {
    let mut config = DiscoveryConfig::new(announcement(fingerprint));
    config.port = port;
    config.interface = Some(LOOPBACK);
    config.multicast_ttl = 1;
    config.announce_interval = INTERVAL;
    config.peer_ttl = INTERVAL * 5;
    config.sweep_interval = Duration::from_millis(100);
    config.receive_timeout = Duration::from_millis(100);
    config
}

fn loopback_socket(port: u16) -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;
    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    #[cfg(unix)]
    socket.set_reuse_port(true).context("SO_REUSEPORT")?;
    socket.set_multicast_if_v4(&LOOPBACK).context("IP_MULTICAST_IF")?;
    socket.set_multicast_loop_v4(true).context("IP_MULTICAST_LOOP")?;
    socket
        .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())
        .context("bind()")?;
    Ok(socket)
}

/// Send raw bytes to the group on `port`, as some other implementation would.
pub fn send_raw(port: u16, bytes: &[u8]) -> Result<()> {
    let socket: UdpSocket = loopback_socket(0)?.into();
    socket
        .send_to(bytes, SocketAddrV4::new(MULTICAST_GROUP, port))
        .context("send_to()")?;
    Ok(())
}

/// Check whether a datagram sent to the group on loopback comes back.
/// Tests call this and skip when it does not.
pub fn multicast_loopback_available(port: u16) -> bool {
    let probe = || -> Result<bool> {
        let socket = loopback_socket(port)?;
        socket
            .join_multicast_v4(&MULTICAST_GROUP, &LOOPBACK)
            .context("IP_ADD_MEMBERSHIP")?;
        let socket: UdpSocket = socket.into();
        socket.set_read_timeout(Some(Duration::from_millis(500)))?;
        socket.send_to(b"probe", SocketAddrV4::new(MULTICAST_GROUP, port))?;
        let mut buf = [0u8; 16];
        Ok(matches!(socket.recv_from(&mut buf), Ok((5, _))))
    };
    probe().unwrap_or(false)
}

/// Poll `check` every 20ms until it holds or `limit` passes.
pub async fn wait_for(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// The harness itself: a probe datagram makes it back.
#[test]
fn test_multicast_loopback_probe() {
    let port = next_port();
    if !multicast_loopback_available(port) {
        eprintln!("SKIP: multicast loopback not available");
        return;
    }
    println!("multicast loopback works on port {port}");
}
