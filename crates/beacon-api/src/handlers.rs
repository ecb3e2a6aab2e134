//! HTTP API handlers exposing discovery state as JSON.

use std::net::SocketAddrV4;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tokio::sync::watch;

use beacon_core::PeerAnnouncement;
use beacon_discovery::{AnnounceState, DiscoveryHandle, DiscoveryTransport, PeerRegistry};

#[derive(Clone)]
pub struct ApiState {
    pub local: PeerAnnouncement,
    pub group: SocketAddrV4,
    pub registry: PeerRegistry,
    pub announce_state: watch::Receiver<AnnounceState>,
}

impl ApiState {
    pub fn from_handle<T: DiscoveryTransport>(handle: &DiscoveryHandle<T>) -> Self {
        Self {
            local: handle.local().clone(),
            group: handle.group(),
            registry: handle.registry().clone(),
            announce_state: handle.announce_state_receiver(),
        }
    }
}

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub fingerprint: String,
    pub alias: String,
    pub group: String,
    pub port: u16,
    pub announce_state: String,
    pub peers_discovered: usize,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let announce_state = state.announce_state.borrow().to_string();
    Json(StatusResponse {
        fingerprint: state.local.fingerprint.clone(),
        alias: state.local.alias.clone(),
        group: state.group.ip().to_string(),
        port: state.group.port(),
        announce_state,
        peers_discovered: state.registry.len(),
    })
}

// ── /peers ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

#[derive(Debug, Serialize)]
pub struct PeerInfo {
    pub fingerprint: String,
    pub alias: String,
    pub device_model: String,
    pub device_type: String,
    pub version: String,
    pub port: u16,
    pub protocol: String,
    pub download: bool,
    pub addr: String,
    pub last_seen_secs: u64,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let peers = state
        .registry
        .list()
        .into_iter()
        .map(|record| {
            let last_seen_secs = record.age().as_secs();
            let a = record.announcement;
            PeerInfo {
                fingerprint: a.fingerprint,
                alias: a.alias,
                device_model: a.device_model,
                device_type: a.device_type.to_string(),
                version: a.version,
                port: a.port,
                protocol: a.protocol.to_string(),
                download: a.download,
                addr: record.source.to_string(),
                last_seen_secs,
            }
        })
        .collect();

    Json(PeersResponse { peers })
}
