use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct PeerInfo {
    fingerprint:    String,
    alias:          String,
    device_model:   String,
    device_type:    String,
    version:        String,
    port:           u16,
    protocol:       String,
    addr:           String,
    last_seen_secs: u64,
}

pub async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers discovered yet.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Discovered Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        let host = p.addr.rsplit_once(':').map(|(h, _)| h).unwrap_or(&p.addr);
        println!("  ┌─ {} ({})", p.alias, short(&p.fingerprint));
        println!("  │  device    : {} {}", p.device_type, p.device_model);
        println!("  │  endpoint  : {}://{}:{}", p.protocol, host, p.port);
        println!("  │  version   : {}", p.version);
        println!("  └─ last seen : {}s ago", p.last_seen_secs);
    }

    Ok(())
}

fn short(fingerprint: &str) -> &str {
    match fingerprint.char_indices().nth(16) {
        Some((i, _)) => &fingerprint[..i],
        None => fingerprint,
    }
}
