//! Multicast transport: the one socket discovery runs on.
//!
//! A single UDP socket bound to the wildcard address on the discovery port,
//! joined to the multicast group. The announce loop sends on it and the
//! listen loop receives on it, so a handle owns exactly one group
//! membership. The membership is dropped on [`DiscoveryTransport::close`],
//! or on `Drop` if close was never reached.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use beacon_core::DiscoveryConfig;

use crate::error::TransportError;

/// What the announce and listen loops need from a socket.
///
/// Implemented by [`MulticastTransport`]; tests drive the loops with an
/// in-memory implementation.
pub trait DiscoveryTransport: Send + Sync + 'static {
    /// Send one datagram to the group.
    fn send(&self, bytes: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receive one datagram into `buf`, waiting at most `timeout`.
    /// Returns the datagram length and its source address.
    fn receive(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<(usize, SocketAddr), TransportError>> + Send;

    /// Leave the group. Idempotent.
    fn close(&self) -> Result<(), TransportError>;
}

/// Socket parameters, split out of [`DiscoveryConfig`].
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    pub group: Ipv4Addr,
    pub port: u16,
    /// Local interface address. `UNSPECIFIED` lets the kernel pick.
    pub interface: Ipv4Addr,
    pub multicast_ttl: u32,
}

impl From<&DiscoveryConfig> for TransportOptions {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            group: config.group,
            port: config.port,
            interface: config.interface.unwrap_or(Ipv4Addr::UNSPECIFIED),
            multicast_ttl: config.multicast_ttl,
        }
    }
}

pub struct MulticastTransport {
    socket: UdpSocket,
    dest: SocketAddrV4,
    interface: Ipv4Addr,
    joined: AtomicBool,
}

impl MulticastTransport {
    /// Bind, join the group and configure outbound multicast.
    ///
    /// Must be called from within a tokio runtime. On any failure the
    /// partially configured socket is dropped before returning.
    pub fn open(opts: TransportOptions) -> Result<Self, TransportError> {
        let bind_err = |source| TransportError::Bind {
            port: opts.port,
            source,
        };

        if !opts.group.is_multicast() {
            return Err(bind_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a multicast address", opts.group),
            )));
        }

        let socket = make_multicast_socket(opts).map_err(bind_err)?;

        socket
            .join_multicast_v4(&opts.group, &opts.interface)
            .map_err(|source| TransportError::Join {
                group: opts.group,
                interface: opts.interface,
                source,
            })?;

        let socket = UdpSocket::from_std(socket.into()).map_err(bind_err)?;

        tracing::info!(
            group = %opts.group,
            port = opts.port,
            interface = %opts.interface,
            ttl = opts.multicast_ttl,
            "joined discovery group"
        );

        Ok(Self {
            socket,
            dest: SocketAddrV4::new(opts.group, opts.port),
            interface: opts.interface,
            joined: AtomicBool::new(true),
        })
    }

    /// Group address and port announcements are sent to.
    pub fn group(&self) -> SocketAddrV4 {
        self.dest
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DiscoveryTransport for MulticastTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let n = self
            .socket
            .send_to(bytes, self.dest)
            .await
            .map_err(TransportError::Send)?;
        tracing::trace!(bytes = n, dest = %self.dest, "announcement sent");
        Ok(())
    }

    async fn receive(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(usize, SocketAddr), TransportError> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok(r)) => Ok(r),
            Ok(Err(e)) => Err(TransportError::Receive(e)),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        if !self.joined.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let group = *self.dest.ip();
        self.socket
            .leave_multicast_v4(group, self.interface)
            .map_err(|source| TransportError::Leave { group, source })?;
        tracing::info!(group = %group, "left discovery group");
        Ok(())
    }
}

impl Drop for MulticastTransport {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!(error = %e, "leave on drop failed");
        }
    }
}

/// Create a non-blocking UDP socket bound to `0.0.0.0:port`, ready to join.
fn make_multicast_socket(opts: TransportOptions) -> std::io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    // Several local processes may listen on the discovery port at once.
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;

    socket.set_multicast_ttl_v4(opts.multicast_ttl)?;
    // Peers on the same host must see each other.
    socket.set_multicast_loop_v4(true)?;
    if !opts.interface.is_unspecified() {
        socket.set_multicast_if_v4(&opts.interface)?;
    }

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, opts.port);
    socket.bind(&bind_addr.into())?;

    Ok(socket)
}
