#![allow(dead_code)]

use peertag_core::participant::PeerId;
use peertag_sim::config::SimConfig;
use peertag_sim::sim::{SimReport, peer_name};

/// Config tuned for quick in-process runs: fast ticks, short stagger.
pub fn fast_config(peers: usize, bots: bool) -> SimConfig {
    let mut config = SimConfig::default();
    config.run.peers = peers;
    config.run.bots_enabled = bots;
    config.run.join_stagger_ms = 50;
    config.sync.tick_hz = 60;
    config.sync.broadcast_hz = 30;
    config
}

pub fn all_peers(n: usize) -> Vec<PeerId> {
    (0..n).map(peer_name).collect()
}

/// Every peer sees exactly `n` participants and no dropped channels.
pub fn assert_full_mesh(report: &SimReport, n: usize) {
    assert_eq!(report.peers.len(), n);
    let expected = all_peers(n);
    for peer in &report.peers {
        assert_eq!(
            peer.participants, expected,
            "{} has a partial room",
            peer.peer
        );
        assert!(peer.dropped.is_empty(), "{} dropped {:?}", peer.peer, peer.dropped);
        assert_eq!(peer.malformed, 0);
        assert!(peer.ticks > 0);
    }
}
