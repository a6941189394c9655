use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::broadcaster::{SequenceCounter, SyncBroadcaster};
use crate::geometry::Vec2;
use crate::net::messages::{JoinMsg, Message, Payload, PowerUpClaimMsg, TagClaimMsg};
use crate::net::protocol::{WireFormat, decode_message, encode_message};
use crate::participant::PeerId;
use crate::powerup::PowerUpId;
use crate::reconciler::{self, Outcome, Reconciler, Rejection, TagClaim};
use crate::registry::{PeerConnection, PeerRegistry};
use crate::room::{Room, RoomConfig, RoomState};
use crate::round::RoundClock;
use crate::spawner::PowerUpSpawner;
use crate::time::Millis;

/// Rates and encoding for the sync loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub broadcast_hz: u32,
    pub tick_hz: u32,
    pub wire_format: WireFormat,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            broadcast_hz: 20,
            tick_hz: 30,
            wire_format: WireFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub room: RoomConfig,
    pub sync: SyncConfig,
}

/// Something the transport handed us between ticks.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Raw bytes read from the data channel of `from`.
    Frame { from: PeerId, data: Vec<u8> },
    Decoded(Message),
}

#[derive(Debug, Clone)]
enum Outbound {
    Broadcast(Message),
    To(PeerId, Message),
}

/// What happened during one [`PeerSession::tick`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Inbound messages that were applied or buffered.
    pub applied: usize,
    pub rejections: Vec<(PeerId, Rejection)>,
    /// Frames that failed to decode or lied about their sender.
    pub malformed: usize,
    /// Peers listed in a freshly applied snapshot that we have no channel to.
    pub dial: Vec<PeerId>,
    /// Peers whose channel failed and were removed.
    pub dropped: Vec<PeerId>,
    /// Peers that sent `leave`.
    pub departed: Vec<PeerId>,
    /// `(previous tagger, new tagger)` for every handoff this tick.
    pub tag_transfers: Vec<(PeerId, PeerId)>,
    /// Round number that ended this tick, if any.
    pub round_ended: Option<u32>,
}

/// One peer's view of a room plus everything needed to keep it in sync.
///
/// The transport only ever calls [`PeerSession::enqueue`]; all state changes
/// happen inside [`PeerSession::tick`] or the local action methods, so the
/// room has a single writer.
pub struct PeerSession<C> {
    local: PeerId,
    config: SessionConfig,
    room: Room,
    registry: PeerRegistry<C>,
    reconciler: Reconciler,
    broadcaster: SyncBroadcaster,
    spawner: PowerUpSpawner,
    clock: RoundClock,
    seq: SequenceCounter,
    inbound: VecDeque<Inbound>,
    outbound: Vec<Outbound>,
    /// Own tag claims made since the last tick.
    fresh_claims: Vec<TagClaim>,
    /// Own tag claims already broadcast, resolved on the next tick together
    /// with whatever peers claimed in the same window.
    held_claims: Vec<TagClaim>,
    was_host: bool,
}

impl<C: PeerConnection> PeerSession<C> {
    fn new(local: PeerId, config: SessionConfig, state: RoomState, seed: u64, now: Millis) -> Self {
        let mut room = Room::new(config.room.clone(), state);
        room.add_participant(local.clone(), config.room.spawn_point());
        Self {
            registry: PeerRegistry::new(local.clone()),
            reconciler: Reconciler::new(),
            broadcaster: SyncBroadcaster::new(config.sync.broadcast_hz),
            spawner: PowerUpSpawner::new(&config.room, seed, now),
            clock: RoundClock::new(config.room.round_duration_ms(), now),
            seq: SequenceCounter::new(),
            inbound: VecDeque::new(),
            outbound: Vec::new(),
            fresh_claims: Vec::new(),
            held_claims: Vec::new(),
            was_host: false,
            local,
            config,
            room,
        }
    }

    /// Open a new room. The local peer is host and first tagger.
    pub fn create(local: PeerId, config: SessionConfig, seed: u64, now: Millis) -> Self {
        let mut session = Self::new(local, config, RoomState::Active, seed, now);
        session.room.set_host(Some(session.local.clone()));
        session.was_host = true;
        tracing::info!(peer = %session.local, "Created room");
        session
    }

    /// Prepare to join an existing room. Call [`PeerSession::connect`] with
    /// the peer to join through; the room activates on its snapshot.
    pub fn join(local: PeerId, config: SessionConfig, seed: u64, now: Millis) -> Self {
        Self::new(local, config, RoomState::AwaitingSnapshot, seed, now)
    }

    pub fn local(&self) -> &PeerId {
        &self.local
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn registry(&self) -> &PeerRegistry<C> {
        &self.registry
    }

    pub fn is_host(&self) -> bool {
        self.room.is_host(&self.local)
    }

    pub fn is_tagger(&self) -> bool {
        self.room.is_tagger(&self.local)
    }

    pub fn round_remaining_ms(&self, now: Millis) -> Millis {
        self.clock.remaining_ms(now)
    }

    /// Register an outgoing channel to `peer` and queue our `join` to it.
    /// Returns false if `peer` was already registered.
    pub fn connect(&mut self, peer: PeerId, handle: C) -> bool {
        if !self.register(peer.clone(), handle) {
            return false;
        }
        let me = self.local_position();
        let msg = self.next_message(Payload::Join(JoinMsg { x: me.x, y: me.y }));
        self.outbound.push(Outbound::To(peer, msg));
        true
    }

    /// Register a channel opened by `peer`. Its `join` will follow.
    pub fn accept(&mut self, peer: PeerId, handle: C) -> bool {
        self.register(peer, handle)
    }

    fn register(&mut self, peer: PeerId, handle: C) -> bool {
        if !self.registry.register(peer.clone(), handle) {
            return false;
        }
        if !self.room.contains(&peer) && !self.room.is_full() {
            let spawn = self.config.room.spawn_point();
            self.room.add_participant(peer.clone(), spawn);
        }
        tracing::debug!(peer = %peer, "Registered peer");
        true
    }

    /// Forget `peer`: its channel, its participant and any timed effects.
    pub fn disconnect(&mut self, peer: &PeerId) {
        self.registry.unregister(peer);
        self.remove_peer(peer);
    }

    fn remove_peer(&mut self, peer: &PeerId) {
        self.room.cancel_effects(peer);
        if self.room.remove_participant(peer).is_some() {
            tracing::info!(peer = %peer, "Removed participant");
        }
        self.reconciler.forget_peer(peer);
    }

    pub fn enqueue(&mut self, event: Inbound) {
        self.inbound.push_back(event);
    }

    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    /// Run one tick: drain inbound, resolve tag claims, expire timers, run
    /// host duties, broadcast, flush, then drop unreachable peers.
    pub fn tick(&mut self, now: Millis) -> TickReport {
        let mut report = TickReport::default();

        while let Some(event) = self.inbound.pop_front() {
            let msg = match event {
                Inbound::Decoded(msg) => msg,
                Inbound::Frame { from, data } => {
                    match decode_message(&data, self.config.sync.wire_format) {
                        Ok(Some(msg)) if msg.peer_id == from => msg,
                        Ok(Some(msg)) => {
                            tracing::debug!(
                                from = %from,
                                claimed = %msg.peer_id,
                                "Dropping frame with mismatched sender"
                            );
                            report.malformed += 1;
                            continue;
                        },
                        Ok(None) => {
                            tracing::debug!(from = %from, "Ignoring unknown message type");
                            continue;
                        },
                        Err(e) => {
                            tracing::debug!(from = %from, error = %e, "Malformed frame");
                            report.malformed += 1;
                            continue;
                        },
                    }
                },
            };
            self.handle_message(msg, now, &mut report);
        }

        for claim in std::mem::take(&mut self.held_claims) {
            self.reconciler
                .queue_tag_claim(claim.claimant, claim.target, claim.seq);
        }
        for resolution in self.reconciler.resolve_tag_claims(&mut self.room) {
            match resolution.outcome {
                Outcome::Applied => report
                    .tag_transfers
                    .push((resolution.claim.target, resolution.claim.claimant)),
                Outcome::Rejected(r) if resolution.claim.claimant != self.local => {
                    report.rejections.push((resolution.claim.claimant, r));
                },
                _ => {},
            }
        }

        self.room.expire_effects(now);
        self.room.expire_powerups(now);

        if self.room.state() == RoomState::Active {
            self.run_host_duties(now, &mut report);
        }

        if let Some(msg) = self
            .broadcaster
            .poll(now, &self.room, &self.local, &mut self.seq)
        {
            self.outbound.push(Outbound::Broadcast(msg));
        }

        let dead = self.flush();
        for peer in dead {
            self.remove_peer(&peer);
            report.dropped.push(peer);
        }
        self.held_claims = std::mem::take(&mut self.fresh_claims);

        report
    }

    fn handle_message(&mut self, msg: Message, now: Millis, report: &mut TickReport) {
        let outcome = self.reconciler.apply(&mut self.room, &self.local, &msg, now);
        match outcome {
            Outcome::Rejected(r) => {
                report.rejections.push((msg.peer_id, r));
                return;
            },
            Outcome::Ignored => return,
            Outcome::Applied | Outcome::Deferred => report.applied += 1,
        }
        if outcome != Outcome::Applied {
            return;
        }

        match &msg.payload {
            Payload::Join(_) => {
                if self.room.state() == RoomState::Active {
                    let snapshot = self
                        .room
                        .snapshot(now, self.clock.remaining_ms(now));
                    let reply = self.next_message(Payload::Snapshot(Box::new(snapshot)));
                    self.outbound.push(Outbound::To(msg.peer_id.clone(), reply));
                }
            },
            Payload::Snapshot(snapshot) => {
                self.clock.resume(snapshot.round_remaining_ms, now);
                self.was_host = self.is_host();
                report.dial = self
                    .room
                    .participants()
                    .keys()
                    .filter(|id| **id != self.local && !self.registry.contains(id))
                    .cloned()
                    .collect();
            },
            Payload::RoundEnd(end) => {
                self.clock.restart(now);
                report.round_ended = Some(end.round);
            },
            Payload::Leave => {
                self.registry.unregister(&msg.peer_id);
                report.departed.push(msg.peer_id.clone());
            },
            _ => {},
        }
    }

    fn run_host_duties(&mut self, now: Millis, report: &mut TickReport) {
        let is_host = self.is_host();
        if is_host && !self.was_host {
            tracing::info!(peer = %self.local, round = self.room.round(), "Promoted to host");
            self.spawner.reset(now);
        }
        self.was_host = is_host;
        if !is_host {
            return;
        }

        if let Some(spawn) = self.spawner.poll(now, &self.room) {
            reconciler::spawn_powerup(&mut self.room, &spawn, now);
            let msg = self.next_message(Payload::PowerUpSpawn(spawn));
            self.outbound.push(Outbound::Broadcast(msg));
        }

        if let Some(end) = self.clock.poll(now, self.room.round()) {
            tracing::info!(round = end.round, "Round over");
            self.room.reset_round();
            self.reconciler.clear();
            self.clock.restart(now);
            report.round_ended = Some(end.round);
            let msg = self.next_message(Payload::RoundEnd(end));
            self.outbound.push(Outbound::Broadcast(msg));
        }
    }

    /// Encode and send everything queued. Returns peers whose send failed.
    fn flush(&mut self) -> Vec<PeerId> {
        let format = self.config.sync.wire_format;
        let mut dead = Vec::new();
        for out in std::mem::take(&mut self.outbound) {
            let msg = match &out {
                Outbound::Broadcast(m) | Outbound::To(_, m) => m,
            };
            let data = match encode_message(msg, format) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(kind = %msg.message_type(), error = %e, "Failed to encode message");
                    continue;
                },
            };
            match &out {
                Outbound::Broadcast(_) => dead.extend(self.registry.broadcast(&data)),
                Outbound::To(peer, _) => {
                    let registered = self.registry.contains(peer);
                    if self.registry.send_to(peer, &data).is_err() && registered {
                        dead.push(peer.clone());
                    }
                },
            }
        }
        dead
    }

    fn next_message(&mut self, payload: Payload) -> Message {
        Message::new(self.local.clone(), self.seq.next(), payload)
    }

    fn local_position(&self) -> Vec2 {
        self.room
            .participant(&self.local)
            .map_or_else(|| self.config.room.spawn_point(), |p| p.position)
    }

    /// Move the local participant. The broadcaster carries the new position
    /// on its next interval.
    pub fn move_to(&mut self, x: f32, y: f32) {
        let position = self.room.config.world.clamp(Vec2::new(x, y));
        if let Some(me) = self.room.participant_mut(&self.local) {
            me.position = position;
        }
    }

    pub fn set_velocity(&mut self, velocity: Vec2) {
        if let Some(me) = self.room.participant_mut(&self.local) {
            me.velocity = velocity;
        }
    }

    /// Advance the local participant along its velocity for `dt_ms`.
    /// `velocity` is a direction scaled by the participant's speed.
    pub fn integrate(&mut self, dt_ms: Millis) {
        let world = self.room.config.world;
        if let Some(me) = self.room.participant_mut(&self.local) {
            let dt = dt_ms as f32 / 1000.0;
            let speed = me.speed();
            let next = Vec2::new(
                me.position.x + me.velocity.x * speed * dt,
                me.position.y + me.velocity.y * speed * dt,
            );
            me.position = world.clamp(next);
        }
    }

    /// Claim that the local peer was caught by `target`, the tagger. The
    /// claim goes out on the next tick and is resolved locally on the one
    /// after, alongside any competing claims that arrived meanwhile.
    pub fn claim_tag(&mut self, target: &PeerId) -> Outcome {
        if !self.room.contains(target) {
            return Outcome::Rejected(Rejection::UnknownPeer);
        }
        if *target == self.local || !self.room.is_tagger(target) {
            return Outcome::Rejected(Rejection::StaleClaim);
        }
        let msg = self.next_message(Payload::TagClaim(TagClaimMsg {
            target: target.clone(),
        }));
        self.fresh_claims.push(TagClaim {
            claimant: self.local.clone(),
            target: target.clone(),
            seq: msg.seq,
        });
        self.outbound.push(Outbound::Broadcast(msg));
        Outcome::Deferred
    }

    /// Pick up a power-up. Applied locally at once and announced to peers.
    pub fn claim_powerup(&mut self, id: &PowerUpId, now: Millis) -> Outcome {
        let outcome = reconciler::claim_powerup(&mut self.room, &self.local, id, now);
        if outcome == Outcome::Applied {
            let msg = self.next_message(Payload::PowerUpClaim(PowerUpClaimMsg {
                power_up_id: id.clone(),
            }));
            self.outbound.push(Outbound::Broadcast(msg));
        }
        outcome
    }

    /// Announce departure and tear the room down.
    pub fn leave(&mut self) {
        let msg = self.next_message(Payload::Leave);
        self.outbound.push(Outbound::Broadcast(msg));
        self.flush();
        tracing::info!(peer = %self.local, peers = self.registry.len(), "Left room");
        self.registry.clear();
        self.room.clear();
        self.reconciler.clear();
        self.inbound.clear();
        self.fresh_claims.clear();
        self.held_claims.clear();
        self.was_host = false;
    }
}
