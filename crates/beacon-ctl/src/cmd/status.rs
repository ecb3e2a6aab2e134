use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct StatusResponse {
    fingerprint:      String,
    alias:            String,
    group:            String,
    port:             u16,
    announce_state:   String,
    peers_discovered: usize,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Beacon Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Alias            : {}", resp.alias);
    println!("  Fingerprint      : {}", resp.fingerprint);
    println!("  Group            : {}:{}", resp.group, resp.port);
    println!("  Announcing       : {}", resp.announce_state);
    println!("  Peers discovered : {}", resp.peers_discovered);

    Ok(())
}
