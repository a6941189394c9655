use crate::geometry::Vec2;
use crate::net::messages::{Message, Payload, PowerUpSpawnMsg};
use crate::participant::PeerId;
use crate::powerup::{PowerUp, PowerUpId, apply_effect};
use crate::room::{Room, RoomSnapshot, RoomState};
use crate::time::Millis;

/// Why an inbound message did not change the room. None of these are
/// errors; the sender is not notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// `seq` at or below the sender's high-water mark.
    StaleMessage,
    /// The claimed resource was already taken or no longer exists.
    StaleClaim,
    /// Sender is not a participant of this room.
    UnknownPeer,
    /// Host-only message from a peer that is not the host.
    NotHost,
    RoomFull,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleMessage => write!(f, "stale message"),
            Self::StaleClaim => write!(f, "stale claim"),
            Self::UnknownPeer => write!(f, "unknown peer"),
            Self::NotHost => write!(f, "sender is not host"),
            Self::RoomFull => write!(f, "room full"),
        }
    }
}

/// Result of applying one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Tag claim buffered until [`Reconciler::resolve_tag_claims`].
    Deferred,
    /// Well-formed but irrelevant here (own echo, late snapshot, duplicate spawn).
    Ignored,
    Rejected(Rejection),
}

/// A buffered tag claim: `claimant` says it was caught by `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagClaim {
    pub claimant: PeerId,
    pub target: PeerId,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagResolution {
    pub claim: TagClaim,
    pub outcome: Outcome,
}

/// Applies inbound messages to a [`Room`].
///
/// Every message passes the per-sender sequence gate first. Tag claims are
/// buffered for the tick and resolved together so simultaneous claims on the
/// same target settle on the lowest `(peerId, seq)` regardless of arrival
/// order.
#[derive(Debug, Default)]
pub struct Reconciler {
    pending_tags: Vec<TagClaim>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_tag_claims(&self) -> &[TagClaim] {
        &self.pending_tags
    }

    /// Drop buffered claims made by or against `peer`.
    pub fn forget_peer(&mut self, peer: &PeerId) {
        self.pending_tags
            .retain(|c| &c.claimant != peer && &c.target != peer);
    }

    pub fn clear(&mut self) {
        self.pending_tags.clear();
    }

    fn admit(room: &mut Room, peer: &PeerId, seq: u64) -> Result<(), Rejection> {
        if !room.contains(peer) {
            return Err(Rejection::UnknownPeer);
        }
        if !room.accept_seq(peer, seq) {
            return Err(Rejection::StaleMessage);
        }
        Ok(())
    }

    /// Apply a message received by `local`.
    pub fn apply(&mut self, room: &mut Room, local: &PeerId, msg: &Message, now: Millis) -> Outcome {
        if &msg.peer_id == local {
            return Outcome::Ignored;
        }
        let sender = &msg.peer_id;
        let outcome = match &msg.payload {
            Payload::Position(p) => self.apply_position(room, sender, p.x, p.y, msg.seq),
            Payload::TagClaim(t) => self.apply_tag_claim(room, sender, &t.target, msg.seq),
            Payload::PowerUpClaim(c) => {
                self.apply_powerup_claim(room, sender, &c.power_up_id, msg.seq, now)
            },
            Payload::Join(j) => self.apply_join(room, sender, j.x, j.y, msg.seq),
            Payload::Leave => self.apply_leave(room, sender, msg.seq),
            Payload::Snapshot(s) => self.apply_snapshot(room, local, sender, s, msg.seq, now),
            Payload::PowerUpSpawn(s) => self.apply_powerup_spawn(room, sender, s, msg.seq, now),
            Payload::RoundEnd(r) => self.apply_round_end(room, sender, r.round, msg.seq),
        };
        if let Outcome::Rejected(reason) = outcome {
            tracing::debug!(
                peer = %sender,
                seq = msg.seq,
                kind = %msg.message_type(),
                %reason,
                "Rejected message"
            );
        }
        outcome
    }

    pub fn apply_position(&mut self, room: &mut Room, peer: &PeerId, x: f32, y: f32, seq: u64) -> Outcome {
        if let Err(r) = Self::admit(room, peer, seq) {
            return Outcome::Rejected(r);
        }
        let position = room.config.world.clamp(Vec2::new(x, y));
        if let Some(p) = room.participant_mut(peer) {
            p.position = position;
        }
        Outcome::Applied
    }

    pub fn apply_tag_claim(
        &mut self,
        room: &mut Room,
        claimant: &PeerId,
        target: &PeerId,
        seq: u64,
    ) -> Outcome {
        if let Err(r) = Self::admit(room, claimant, seq) {
            return Outcome::Rejected(r);
        }
        if claimant == target {
            return Outcome::Rejected(Rejection::StaleClaim);
        }
        self.queue_tag_claim(claimant.clone(), target.clone(), seq);
        Outcome::Deferred
    }

    /// Buffer a claim without the sequence gate (the local peer's own claims).
    pub fn queue_tag_claim(&mut self, claimant: PeerId, target: PeerId, seq: u64) {
        self.pending_tags.push(TagClaim {
            claimant,
            target,
            seq,
        });
    }

    /// Settle every buffered claim. Claims are grouped by target; in each
    /// group the lowest `(claimant, seq)` wins and the rest are stale. A
    /// winner only takes effect if its target is still the tagger.
    pub fn resolve_tag_claims(&mut self, room: &mut Room) -> Vec<TagResolution> {
        let mut pending = std::mem::take(&mut self.pending_tags);
        pending.sort_by(|a, b| {
            (&a.target, &a.claimant, a.seq).cmp(&(&b.target, &b.claimant, b.seq))
        });

        let mut resolutions = Vec::with_capacity(pending.len());
        for group in pending.chunk_by(|a, b| a.target == b.target) {
            let winner = &group[0];
            let outcome = if room.is_tagger(&winner.target)
                && winner.claimant != winner.target
                && room.contains(&winner.claimant)
            {
                room.set_tagger(Some(winner.claimant.clone()));
                tracing::info!(
                    from = %winner.target,
                    to = %winner.claimant,
                    seq = winner.seq,
                    "Tagger handed off"
                );
                Outcome::Applied
            } else {
                Outcome::Rejected(Rejection::StaleClaim)
            };
            resolutions.push(TagResolution {
                claim: winner.clone(),
                outcome,
            });
            for loser in &group[1..] {
                tracing::debug!(
                    claimant = %loser.claimant,
                    target = %loser.target,
                    seq = loser.seq,
                    "Tag claim lost tie-break"
                );
                resolutions.push(TagResolution {
                    claim: loser.clone(),
                    outcome: Outcome::Rejected(Rejection::StaleClaim),
                });
            }
        }
        resolutions
    }

    pub fn apply_powerup_claim(
        &mut self,
        room: &mut Room,
        peer: &PeerId,
        power_up_id: &PowerUpId,
        seq: u64,
        now: Millis,
    ) -> Outcome {
        if let Err(r) = Self::admit(room, peer, seq) {
            return Outcome::Rejected(r);
        }
        claim_powerup(room, peer, power_up_id, now)
    }

    pub fn apply_join(&mut self, room: &mut Room, peer: &PeerId, x: f32, y: f32, seq: u64) -> Outcome {
        if !room.contains(peer) {
            if room.last_seen_seq(peer).is_some_and(|last| seq <= last) {
                return Outcome::Rejected(Rejection::StaleMessage);
            }
            if room.is_full() {
                return Outcome::Rejected(Rejection::RoomFull);
            }
            room.accept_seq(peer, seq);
            room.add_participant(peer.clone(), Vec2::new(x, y));
            tracing::info!(peer = %peer, "Participant joined");
            return Outcome::Applied;
        }
        self.apply_position(room, peer, x, y, seq)
    }

    pub fn apply_leave(&mut self, room: &mut Room, peer: &PeerId, seq: u64) -> Outcome {
        if let Err(r) = Self::admit(room, peer, seq) {
            return Outcome::Rejected(r);
        }
        room.remove_participant(peer);
        self.forget_peer(peer);
        tracing::info!(peer = %peer, "Participant left");
        Outcome::Applied
    }

    /// Only the first snapshot after joining is applied; later ones (from
    /// peers dialed afterwards) just advance the sender's sequence.
    pub fn apply_snapshot(
        &mut self,
        room: &mut Room,
        local: &PeerId,
        sender: &PeerId,
        snapshot: &RoomSnapshot,
        seq: u64,
        now: Millis,
    ) -> Outcome {
        if room.state() == RoomState::Active {
            return match Self::admit(room, sender, seq) {
                Ok(()) => Outcome::Ignored,
                Err(r) => Outcome::Rejected(r),
            };
        }
        if room.last_seen_seq(sender).is_some_and(|last| seq <= last) {
            return Outcome::Rejected(Rejection::StaleMessage);
        }
        room.apply_snapshot(snapshot, local, sender, seq, now);
        self.pending_tags.clear();
        tracing::info!(
            from = %sender,
            participants = room.len(),
            round = room.round(),
            "Applied room snapshot"
        );
        Outcome::Applied
    }

    pub fn apply_powerup_spawn(
        &mut self,
        room: &mut Room,
        sender: &PeerId,
        spawn: &PowerUpSpawnMsg,
        seq: u64,
        now: Millis,
    ) -> Outcome {
        if let Err(r) = Self::admit(room, sender, seq) {
            return Outcome::Rejected(r);
        }
        if !room.is_host(sender) {
            return Outcome::Rejected(Rejection::NotHost);
        }
        if spawn_powerup(room, spawn, now) {
            Outcome::Applied
        } else {
            Outcome::Ignored
        }
    }

    pub fn apply_round_end(&mut self, room: &mut Room, sender: &PeerId, round: u32, seq: u64) -> Outcome {
        if let Err(r) = Self::admit(room, sender, seq) {
            return Outcome::Rejected(r);
        }
        if !room.is_host(sender) {
            return Outcome::Rejected(Rejection::NotHost);
        }
        if round != room.round() {
            return Outcome::Rejected(Rejection::StaleMessage);
        }
        room.reset_round();
        self.pending_tags.clear();
        Outcome::Applied
    }
}

/// First-writer-wins power-up claim, without the sequence gate.
pub fn claim_powerup(room: &mut Room, peer: &PeerId, id: &PowerUpId, now: Millis) -> Outcome {
    if !room.contains(peer) {
        return Outcome::Rejected(Rejection::UnknownPeer);
    }
    let Some(power_up) = room.powerup_mut(id) else {
        return Outcome::Rejected(Rejection::StaleClaim);
    };
    if !power_up.is_claimable(now) {
        return Outcome::Rejected(Rejection::StaleClaim);
    }
    power_up.claimed_by = Some(peer.clone());
    let power_up = power_up.clone();
    let area = room.config.teleport_area;
    apply_effect(room.participants_mut(), peer, &power_up, &area, now);
    tracing::debug!(peer = %peer, id = %power_up.id, kind = ?power_up.kind, "Power-up claimed");
    Outcome::Applied
}

/// Place a spawned power-up on the field. Returns false for a duplicate id.
/// The timeout is capped at the room's `powerup_ttl_ms`.
pub fn spawn_powerup(room: &mut Room, spawn: &PowerUpSpawnMsg, now: Millis) -> bool {
    let position = room.config.world.clamp(Vec2::new(spawn.x, spawn.y));
    let ttl_ms = spawn.ttl_ms.min(room.config.powerup_ttl_ms);
    room.insert_powerup(PowerUp {
        id: spawn.id.clone(),
        kind: spawn.kind,
        position,
        claimed_by: None,
        expires_at: now.saturating_add(ttl_ms),
    })
}
