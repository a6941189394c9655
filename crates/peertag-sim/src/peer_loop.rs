use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use peertag_core::participant::PeerId;
use peertag_core::session::{Inbound, PeerSession, SessionConfig, TickReport};
use peertag_core::time::{Millis, millis_since};

use crate::bot::Bot;
use crate::config::BotConfig;
use crate::transport::{ChannelConnection, PeerEvent, Switchboard};

/// How a peer enters the room.
#[derive(Debug, Clone)]
pub enum Role {
    Create,
    JoinVia(PeerId),
}

/// Everything a peer task needs to run.
pub struct PeerSetup {
    pub local: PeerId,
    pub role: Role,
    pub session: SessionConfig,
    /// `None` leaves the participant idle.
    pub bot: Option<BotConfig>,
    pub seed: u64,
    pub switchboard: Switchboard,
}

/// A peer's final view of the room plus counters from its tick loop.
#[derive(Debug, Clone, Default)]
pub struct PeerSummary {
    pub peer: PeerId,
    pub participants: Vec<PeerId>,
    pub tagger: Option<PeerId>,
    pub host: Option<PeerId>,
    pub round: u32,
    pub scores: BTreeMap<PeerId, i32>,
    pub ticks: u64,
    pub applied: usize,
    pub malformed: usize,
    pub rejections: usize,
    pub tag_transfers: usize,
    pub rounds_ended: usize,
    pub dropped: Vec<PeerId>,
}

impl PeerSummary {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.applied += report.applied;
        self.malformed += report.malformed;
        self.rejections += report.rejections.len();
        self.tag_transfers += report.tag_transfers.len();
        self.rounds_ended += usize::from(report.round_ended.is_some());
        self.dropped.extend(report.dropped.iter().cloned());
    }

    fn capture(&mut self, session: &PeerSession<ChannelConnection>) {
        let room = session.room();
        self.participants = room.participants().keys().cloned().collect();
        self.tagger = room.tagger().cloned();
        self.host = room.host().cloned();
        self.round = room.round();
        self.scores = room
            .participants()
            .iter()
            .map(|(id, p)| (id.clone(), p.score))
            .collect();
    }
}

fn dial(session: &mut PeerSession<ChannelConnection>, switchboard: &Switchboard, to: &PeerId) {
    if session.registry().contains(to) {
        return;
    }
    match switchboard.open(session.local(), to) {
        Ok(conn) => {
            session.connect(to.clone(), conn);
        },
        Err(e) => tracing::warn!(peer = %session.local(), to = %to, error = %e, "Dial failed"),
    }
}

/// Run one peer until it receives [`PeerEvent::Shutdown`] or its inbox
/// closes. Ticks at `sync.tick_hz`; inbound frames are only queued between
/// ticks and applied inside [`PeerSession::tick`].
pub async fn run_peer(setup: PeerSetup, mut inbox: mpsc::Receiver<PeerEvent>) -> PeerSummary {
    let PeerSetup {
        local,
        role,
        session: config,
        bot,
        seed,
        switchboard,
    } = setup;

    let tick_ms = (1000 / u64::from(config.sync.tick_hz.max(1))).max(1);
    let mut session = match role {
        Role::Create => PeerSession::create(local.clone(), config, seed, 0),
        Role::JoinVia(via) => {
            let mut session = PeerSession::join(local.clone(), config, seed, 0);
            dial(&mut session, &switchboard, &via);
            session
        },
    };
    let mut bot = bot.map(|cfg| Bot::new(cfg, seed));
    let mut summary = PeerSummary {
        peer: local.clone(),
        ..PeerSummary::default()
    };

    let start = Instant::now();
    let mut last_tick: Millis = 0;
    let mut paused = false;
    let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick(), if !paused => {
                let now = millis_since(start);
                if let Some(bot) = bot.as_mut() {
                    bot.drive(&mut session, now, now.saturating_sub(last_tick));
                }
                last_tick = now;

                let report = session.tick(now);
                for peer in &report.dial {
                    dial(&mut session, &switchboard, peer);
                }
                if let Some(round) = report.round_ended {
                    tracing::info!(peer = %local, round, "Round ended");
                }
                summary.record(&report);
            }
            event = inbox.recv() => match event {
                Some(PeerEvent::Frame { from, data }) => {
                    session.enqueue(Inbound::Frame { from, data: data.to_vec() });
                },
                Some(PeerEvent::Opened { from, conn }) => {
                    session.accept(from, conn);
                },
                Some(PeerEvent::Pause) => paused = true,
                Some(PeerEvent::Shutdown) | None => break,
            }
        }
    }

    summary.capture(&session);
    session.leave();
    tracing::debug!(peer = %local, ticks = summary.ticks, "Peer stopped");
    summary
}
