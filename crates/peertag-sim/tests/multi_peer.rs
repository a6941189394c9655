mod common;

use std::time::Duration;

use peertag_core::net::protocol::WireFormat;
use peertag_core::participant::PeerId;
use peertag_sim::sim::run_for;

use common::{assert_full_mesh, fast_config};

#[tokio::test]
async fn idle_peers_join_and_converge() {
    let config = fast_config(4, false);
    let report = run_for(&config, Duration::from_millis(1_200)).await;

    assert_full_mesh(&report, 4);
    assert!(report.converged());
    for peer in &report.peers {
        assert_eq!(peer.host, Some(PeerId::from("peer-00")));
        assert_eq!(peer.tagger, Some(PeerId::from("peer-00")));
    }
}

#[tokio::test]
async fn messagepack_peers_converge() {
    let mut config = fast_config(3, false);
    config.sync.wire_format = WireFormat::MessagePack;
    let report = run_for(&config, Duration::from_millis(1_000)).await;

    assert_full_mesh(&report, 3);
    assert!(report.converged());
}

#[tokio::test]
async fn host_round_end_reaches_every_peer() {
    let mut config = fast_config(4, false);
    config.room.round_duration_secs = 1;
    let report = run_for(&config, Duration::from_millis(1_500)).await;

    assert_full_mesh(&report, 4);
    for peer in &report.peers {
        assert_eq!(peer.round, 2, "{} missed the round end", peer.peer);
        assert_eq!(peer.scores[&PeerId::from("peer-00")], 0);
        assert_eq!(peer.scores[&PeerId::from("peer-03")], 1);
    }
}

#[tokio::test]
async fn bots_play_with_one_tagger_per_view() {
    let mut config = fast_config(4, true);
    config.room.powerup_spawn_interval_ms = 200;
    let report = run_for(&config, Duration::from_millis(2_000)).await;

    assert_full_mesh(&report, 4);
    for peer in &report.peers {
        let tagger = peer.tagger.as_ref().expect("room has a tagger");
        assert!(peer.participants.contains(tagger));
        assert_eq!(peer.host, Some(PeerId::from("peer-00")));
    }
}
