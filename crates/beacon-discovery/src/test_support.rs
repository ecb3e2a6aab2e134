//! In-memory transport and fixtures for driving the loops in unit tests.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use beacon_core::{DeviceType, PeerAnnouncement, Protocol};

use crate::error::TransportError;
use crate::registry::PeerRegistry;
use crate::transport::DiscoveryTransport;

pub fn announcement(fingerprint: &str) -> PeerAnnouncement {
    PeerAnnouncement {
        fingerprint: fingerprint.to_string(),
        alias: format!("{fingerprint}-alias"),
        device_model: "Test".to_string(),
        device_type: DeviceType::Desktop,
        version: "2.0".to_string(),
        port: 53317,
        protocol: Protocol::Https,
        download: false,
        announce: true,
    }
}

pub fn peer_addr() -> SocketAddr {
    "192.168.1.50:53317".parse().unwrap()
}

/// Something the mock hands to `receive`.
pub enum Inbound {
    Datagram(Vec<u8>, SocketAddr),
    Error(io::ErrorKind),
}

/// Transport backed by a channel. Sends are recorded; the first
/// `failing_sends` sends fail.
pub struct MockTransport {
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    sent: Mutex<Vec<PeerAnnouncement>>,
    failing_sends: AtomicU32,
    fail_forever: AtomicBool,
    receive_error: Mutex<Option<io::ErrorKind>>,
    receive_calls: AtomicU32,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new() -> (Self, mpsc::UnboundedSender<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            inbound: tokio::sync::Mutex::new(rx),
            sent: Mutex::new(Vec::new()),
            failing_sends: AtomicU32::new(0),
            fail_forever: AtomicBool::new(false),
            receive_error: Mutex::new(None),
            receive_calls: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        };
        (transport, tx)
    }

    pub fn fail_next_sends(&self, n: u32) {
        self.failing_sends.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_forever(&self, fail: bool) {
        self.fail_forever.store(fail, Ordering::SeqCst);
    }

    /// Make every `receive` fail at once with `kind` until cleared.
    pub fn set_receive_error(&self, kind: Option<io::ErrorKind>) {
        *self.receive_error.lock().unwrap() = kind;
    }

    pub fn receive_calls(&self) -> u32 {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<PeerAnnouncement> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl DiscoveryTransport for MockTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let failing = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing || self.fail_forever.load(Ordering::SeqCst) {
            return Err(TransportError::Send(io::Error::new(
                io::ErrorKind::NetworkUnreachable,
                "network is unreachable",
            )));
        }
        let ann = PeerAnnouncement::from_datagram(bytes).expect("loops only send valid announcements");
        self.sent.lock().unwrap().push(ann);
        Ok(())
    }

    async fn receive(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(usize, SocketAddr), TransportError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        let injected = *self.receive_error.lock().unwrap();
        if let Some(kind) = injected {
            return Err(TransportError::Receive(io::Error::new(kind, "injected")));
        }
        let mut inbound = self.inbound.lock().await;
        match tokio::time::timeout(timeout, inbound.recv()).await {
            Ok(Some(Inbound::Datagram(bytes, source))) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok((len, source))
            }
            Ok(Some(Inbound::Error(kind))) => {
                Err(TransportError::Receive(io::Error::new(kind, "injected")))
            }
            // Sender gone: behave like a quiet network.
            Ok(None) => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Timeout(timeout))
            }
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll `check` until it holds or `limit` of (tokio) time passes.
pub async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn has_peer(registry: &PeerRegistry, fingerprint: &str) -> bool {
    registry.get(fingerprint).is_some()
}
