use std::time::{Duration, Instant};

use beacon_discovery::{start, AnnounceState};

use crate::*;

macro_rules! skip_without_multicast {
    ($port:expr) => {
        if !multicast_loopback_available($port) {
            eprintln!("SKIP: multicast loopback not available");
            return;
        }
    };
}

fn fingerprints(handle: &beacon_discovery::DiscoveryHandle) -> Vec<String> {
    handle
        .peers()
        .into_iter()
        .map(|p| p.announcement.fingerprint)
        .collect()
}

#[tokio::test]
async fn test_two_handles_discover_each_other() {
    let port = next_port();
    skip_without_multicast!(port);

    let a = start(config("node-a", port)).expect("node-a should start");
    let b = start(config("node-b", port)).expect("node-b should start");

    let found = wait_for(INTERVAL * 2 + Duration::from_millis(300), || {
        a.peers().len() == 1 && b.peers().len() == 1
    })
    .await;
    assert!(found, "a sees {:?}, b sees {:?}", fingerprints(&a), fingerprints(&b));

    assert_eq!(fingerprints(&a), ["node-b"]);
    assert_eq!(fingerprints(&b), ["node-a"]);
    assert_eq!(a.announce_state(), AnnounceState::Idle);

    let record = &a.peers()[0];
    assert_eq!(record.announcement.alias, "it-node-b");
    assert_eq!(record.source.port(), port);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_departure_removes_peer_before_ttl() {
    let port = next_port();
    skip_without_multicast!(port);

    let mut cfg = config("stayer", port);
    cfg.peer_ttl = Duration::from_secs(30);
    let stayer = start(cfg).expect("stayer should start");
    let leaver = start(config("leaver", port)).expect("leaver should start");

    assert!(wait_for(Duration::from_secs(2), || fingerprints(&stayer) == ["leaver"]).await);

    leaver.stop().await;
    assert!(
        wait_for(Duration::from_secs(1), || stayer.peers().is_empty()).await,
        "departure must remove the peer long before the 30s ttl"
    );

    stayer.stop().await;
}

#[tokio::test]
async fn test_listener_survives_malformed_datagrams() {
    let port = next_port();
    skip_without_multicast!(port);

    let mut cfg = config("listener", port);
    cfg.listen_only = true;
    let handle = start(cfg).expect("listener should start");

    send_raw(port, b"Hello, Multicast! This is a test message.").unwrap();
    send_raw(port, b"{\"fingerprint\":").unwrap();
    send_raw(port, br#"{"fingerprint":"x","port":"not a number"}"#).unwrap();
    send_raw(port, &[0xff, 0xfe, 0xfd]).unwrap();
    send_raw(port, &serde_json::to_vec(&announcement("raw-peer")).unwrap()).unwrap();

    assert!(wait_for(Duration::from_secs(2), || fingerprints(&handle) == ["raw-peer"]).await);

    handle.stop().await;
}

#[tokio::test]
async fn test_own_announcements_never_listed() {
    let port = next_port();
    skip_without_multicast!(port);

    let handle = start(config("loner", port)).expect("loner should start");
    tokio::time::sleep(INTERVAL * 4).await;
    assert!(handle.peers().is_empty());

    handle.stop().await;
}

#[tokio::test]
async fn test_silent_peer_expires() {
    let port = next_port();
    skip_without_multicast!(port);

    let mut cfg = config("watcher", port);
    cfg.listen_only = true;
    let ttl = cfg.peer_ttl;
    let handle = start(cfg).expect("watcher should start");

    send_raw(port, &serde_json::to_vec(&announcement("ghost")).unwrap()).unwrap();
    assert!(wait_for(Duration::from_secs(1), || fingerprints(&handle) == ["ghost"]).await);

    assert!(
        wait_for(ttl + Duration::from_secs(1), || handle.peers().is_empty()).await,
        "peer must be swept once its ttl passes"
    );

    handle.stop().await;
}

#[tokio::test]
async fn test_stop_returns_within_receive_timeout() {
    let port = next_port();
    skip_without_multicast!(port);

    let mut cfg = config("quitter", port);
    cfg.receive_timeout = Duration::from_millis(300);
    let timeout = cfg.receive_timeout;
    let handle = start(cfg).expect("quitter should start");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    handle.stop().await;
    let took = started.elapsed();
    assert!(took <= timeout + Duration::from_millis(200), "stop took {took:?}");
}
