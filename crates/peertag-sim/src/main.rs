use tracing_subscriber::EnvFilter;

use peertag_sim::config::SimConfig;
use peertag_sim::sim::run_simulation;

fn arg_value<T: std::str::FromStr>(prefix: &str) -> Option<T> {
    std::env::args()
        .skip(1)
        .find_map(|a| a.strip_prefix(prefix).map(String::from))
        .and_then(|v| v.parse::<T>().ok())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut config = SimConfig::load();
    if let Some(peers) = arg_value("--peers=") {
        config.run.peers = peers;
    }
    if let Some(secs) = arg_value("--duration=") {
        config.run.duration_secs = secs;
    }
    if let Some(seed) = arg_value("--seed=") {
        config.run.seed = seed;
    }
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    tracing::info!(
        peers = config.run.peers,
        duration_secs = config.run.duration_secs,
        wire_format = ?config.sync.wire_format,
        "peertag simulation starting"
    );

    let report = run_simulation(&config).await;
    for peer in &report.peers {
        tracing::info!(
            peer = %peer.peer,
            participants = peer.participants.len(),
            tagger = ?peer.tagger,
            host = ?peer.host,
            round = peer.round,
            ticks = peer.ticks,
            rejections = peer.rejections,
            malformed = peer.malformed,
            "Peer summary"
        );
    }
    tracing::info!(
        converged = report.converged(),
        tag_transfers = report.total_tag_transfers(),
        "Simulation finished"
    );
}
