//! Peer registry: who is on the LAN right now.
//!
//! A concurrent map from fingerprint to [`PeerRecord`], written by the
//! listen loop and the expiry sweep, read by anyone holding a clone.
//! Every operation takes the map's shard lock for the duration of the call
//! only; nothing here awaits.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use beacon_core::PeerAnnouncement;

/// A discovered peer, as last heard.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub announcement: PeerAnnouncement,
    /// Source address of the most recent announcement datagram.
    pub source: SocketAddr,
    /// When the peer was last heard. Drives expiry and `list()` order.
    pub last_seen: Instant,
}

impl PeerRecord {
    /// Record for an announcement heard just now.
    pub fn new(announcement: PeerAnnouncement, source: SocketAddr) -> Self {
        Self::seen_at(announcement, source, Instant::now())
    }

    pub fn seen_at(announcement: PeerAnnouncement, source: SocketAddr, last_seen: Instant) -> Self {
        Self {
            announcement,
            source,
            last_seen,
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.announcement.fingerprint
    }

    /// Time since the peer was last heard.
    pub fn age(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

/// The peer registry. Cheap to clone; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<DashMap<String, PeerRecord>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a peer. Returns `true` if the fingerprint was not
    /// present before.
    pub fn upsert(&self, record: PeerRecord) -> bool {
        let key = record.announcement.fingerprint.clone();
        self.peers.insert(key, record).is_none()
    }

    /// Drop a peer immediately. Returns the removed record, if any.
    pub fn remove(&self, fingerprint: &str) -> Option<PeerRecord> {
        self.peers.remove(fingerprint).map(|(_, record)| record)
    }

    pub fn get(&self, fingerprint: &str) -> Option<PeerRecord> {
        self.peers.get(fingerprint).map(|r| r.value().clone())
    }

    /// Snapshot of all peers, most recently seen first.
    pub fn list(&self) -> Vec<PeerRecord> {
        let mut peers: Vec<PeerRecord> = self.peers.iter().map(|r| r.value().clone()).collect();
        peers.sort_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| a.fingerprint().cmp(b.fingerprint()))
        });
        peers
    }

    /// Remove every peer not heard from for longer than `ttl` as of `now`.
    /// Returns how many were removed.
    pub fn sweep_expired(&self, now: Instant, ttl: Duration) -> usize {
        let mut removed = 0;
        self.peers.retain(|_, record| {
            let keep = now.saturating_duration_since(record.last_seen) <= ttl;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
