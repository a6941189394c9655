use std::time::Duration;

use tokio::task::JoinHandle;

use peertag_core::participant::PeerId;

use crate::config::SimConfig;
use crate::peer_loop::{PeerSetup, PeerSummary, Role, run_peer};
use crate::transport::Switchboard;

/// Outcome of a whole simulation run, one summary per peer.
#[derive(Debug, Clone, Default)]
pub struct SimReport {
    pub peers: Vec<PeerSummary>,
}

impl SimReport {
    /// True when every peer ended with the same participants, tagger and host.
    pub fn converged(&self) -> bool {
        let Some(first) = self.peers.first() else {
            return true;
        };
        self.peers.iter().all(|p| {
            p.participants == first.participants && p.tagger == first.tagger && p.host == first.host
        })
    }

    pub fn total_tag_transfers(&self) -> usize {
        self.peers.iter().map(|p| p.tag_transfers).sum()
    }
}

pub fn peer_name(index: usize) -> PeerId {
    PeerId::new(format!("peer-{index:02}"))
}

/// Run `config.run.peers` peers for `config.run.duration_secs`. `peer-00`
/// creates the room; the rest join through it one by one.
pub async fn run_simulation(config: &SimConfig) -> SimReport {
    run_for(config, Duration::from_secs(config.run.duration_secs)).await
}

/// Same as [`run_simulation`] with an explicit run time.
pub async fn run_for(config: &SimConfig, duration: Duration) -> SimReport {
    let ids: Vec<PeerId> = (0..config.run.peers).map(peer_name).collect();
    let mut switchboard = Switchboard::default();
    let inboxes: Vec<_> = ids
        .iter()
        .map(|id| switchboard.add_peer(id.clone(), config.run.channel_capacity))
        .collect();

    let mut handles: Vec<JoinHandle<PeerSummary>> = Vec::with_capacity(ids.len());
    for (i, (id, inbox)) in ids.iter().zip(inboxes).enumerate() {
        let role = if i == 0 {
            Role::Create
        } else {
            tokio::time::sleep(Duration::from_millis(config.run.join_stagger_ms)).await;
            Role::JoinVia(ids[0].clone())
        };
        let setup = PeerSetup {
            local: id.clone(),
            role,
            session: config.session_config(),
            bot: config.run.bots_enabled.then(|| config.bots.clone()),
            seed: config.run.seed.wrapping_add(i as u64),
            switchboard: switchboard.clone(),
        };
        tracing::info!(peer = %id, "Starting peer");
        handles.push(tokio::spawn(run_peer(setup, inbox)));
    }

    tokio::time::sleep(duration).await;
    switchboard.shutdown_all().await;

    let mut report = SimReport::default();
    for handle in handles {
        match handle.await {
            Ok(summary) => report.peers.push(summary),
            Err(e) => tracing::error!(error = %e, "Peer task failed"),
        }
    }
    report
}
