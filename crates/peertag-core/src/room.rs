use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::geometry::{Rect, Vec2};
use crate::participant::{Participant, PeerId};
use crate::powerup::{
    Effect, INVISIBLE_ALPHA, INVISIBLE_DURATION_MS, PowerUp, PowerUpId, PowerUpKind,
    SPEED_DURATION_MS, SPEED_MULTIPLIER,
};
use crate::time::Millis;

/// Configuration for a peertag room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    pub max_participants: usize,
    /// Playfield bounds; positions are clamped into it.
    pub world: Rect,
    /// Where the authoritative spawner may place power-ups.
    pub spawn_area: Rect,
    /// Where TELEPORT may relocate its claimant.
    pub teleport_area: Rect,
    pub round_duration_secs: u64,
    pub powerup_spawn_interval_ms: u64,
    pub powerup_ttl_ms: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_participants: 16,
            world: Rect::new(0.0, 0.0, 800.0, 600.0),
            spawn_area: Rect::new(50.0, 50.0, 750.0, 550.0),
            teleport_area: Rect::new(100.0, 100.0, 700.0, 500.0),
            round_duration_secs: 180,
            powerup_spawn_interval_ms: 10_000,
            powerup_ttl_ms: 15_000,
        }
    }
}

impl RoomConfig {
    pub fn round_duration_ms(&self) -> Millis {
        self.round_duration_secs.saturating_mul(1000)
    }

    /// Where new participants appear before their first position update.
    pub fn spawn_point(&self) -> Vec2 {
        self.world.center()
    }
}

/// Current state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    /// Joined a peer but no snapshot has arrived yet.
    AwaitingSnapshot,
    Active,
}

/// The single owned aggregate of everything this peer knows about the room.
#[derive(Debug, Clone)]
pub struct Room {
    pub config: RoomConfig,
    state: RoomState,
    participants: BTreeMap<PeerId, Participant>,
    tagger: Option<PeerId>,
    host: Option<PeerId>,
    powerups: BTreeMap<PowerUpId, PowerUp>,
    last_seen_seq: HashMap<PeerId, u64>,
    round: u32,
}

impl Room {
    pub fn new(config: RoomConfig, state: RoomState) -> Self {
        Self {
            config,
            state,
            participants: BTreeMap::new(),
            tagger: None,
            host: None,
            powerups: BTreeMap::new(),
            last_seen_seq: HashMap::new(),
            round: 1,
        }
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn participants(&self) -> &BTreeMap<PeerId, Participant> {
        &self.participants
    }

    pub fn participants_mut(&mut self) -> &mut BTreeMap<PeerId, Participant> {
        &mut self.participants
    }

    pub fn participant(&self, id: &PeerId) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn participant_mut(&mut self, id: &PeerId) -> Option<&mut Participant> {
        self.participants.get_mut(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.participants.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.config.max_participants
    }

    /// Add a participant if absent. In an active room the first participant
    /// becomes tagger. Returns true when the participant is new.
    pub fn add_participant(&mut self, id: PeerId, position: Vec2) -> bool {
        if self.participants.contains_key(&id) {
            return false;
        }
        let position = self.config.world.clamp(position);
        self.participants
            .insert(id.clone(), Participant::new(id.clone(), position));
        if self.state == RoomState::Active && self.tagger.is_none() {
            self.set_tagger(Some(id));
        }
        true
    }

    /// Remove a participant, handing tagger/host to the smallest remaining
    /// peer id if needed. Its sequence high-water mark stays until
    /// [`Room::clear`] so delayed frames from it are still stale.
    pub fn remove_participant(&mut self, id: &PeerId) -> Option<Participant> {
        let removed = self.participants.remove(id)?;
        if self.tagger.as_ref() == Some(id) {
            let next = self.participants.keys().next().cloned();
            self.set_tagger(next);
        }
        if self.host.as_ref() == Some(id) {
            self.host = self.participants.keys().next().cloned();
        }
        Some(removed)
    }

    pub fn tagger(&self) -> Option<&PeerId> {
        self.tagger.as_ref()
    }

    pub fn is_tagger(&self, id: &PeerId) -> bool {
        self.tagger.as_ref() == Some(id)
    }

    /// Move tagger status. Per-participant flags are rewritten from the
    /// single `tagger` slot so at most one can be set.
    pub fn set_tagger(&mut self, id: Option<PeerId>) {
        let id = id.filter(|id| self.participants.contains_key(id));
        for (pid, p) in self.participants.iter_mut() {
            p.is_tagger = id.as_ref() == Some(pid);
        }
        self.tagger = id;
    }

    pub fn tagger_count(&self) -> usize {
        self.participants.values().filter(|p| p.is_tagger).count()
    }

    pub fn host(&self) -> Option<&PeerId> {
        self.host.as_ref()
    }

    pub fn is_host(&self, id: &PeerId) -> bool {
        self.host.as_ref() == Some(id)
    }

    pub fn set_host(&mut self, id: Option<PeerId>) {
        self.host = id;
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn last_seen_seq(&self, id: &PeerId) -> Option<u64> {
        self.last_seen_seq.get(id).copied()
    }

    /// Advance the sender's high-water mark. Returns false when `seq` is
    /// not strictly greater than the last accepted one.
    pub fn accept_seq(&mut self, id: &PeerId, seq: u64) -> bool {
        match self.last_seen_seq.get(id) {
            Some(&last) if seq <= last => false,
            _ => {
                self.last_seen_seq.insert(id.clone(), seq);
                true
            },
        }
    }

    pub fn powerup(&self, id: &PowerUpId) -> Option<&PowerUp> {
        self.powerups.get(id)
    }

    pub fn powerup_mut(&mut self, id: &PowerUpId) -> Option<&mut PowerUp> {
        self.powerups.get_mut(id)
    }

    /// Power-ups still lying on the field.
    pub fn field_powerups(&self, now: Millis) -> impl Iterator<Item = &PowerUp> {
        self.powerups.values().filter(move |p| p.is_claimable(now))
    }

    /// Insert a spawned power-up. An id already in the ledger is left alone.
    pub fn insert_powerup(&mut self, powerup: PowerUp) -> bool {
        if self.powerups.contains_key(&powerup.id) {
            return false;
        }
        self.powerups.insert(powerup.id.clone(), powerup);
        true
    }

    /// Drop unclaimed power-ups whose timeout has passed.
    pub fn expire_powerups(&mut self, now: Millis) -> usize {
        let before = self.powerups.len();
        self.powerups.retain(|_, p| !p.is_expired(now));
        before - self.powerups.len()
    }

    /// Clear timed effects that are due. Returns the affected peers.
    pub fn expire_effects(&mut self, now: Millis) -> Vec<PeerId> {
        let mut expired = Vec::new();
        for (id, p) in self.participants.iter_mut() {
            if p.effect_expired(now) {
                p.clear_effect();
                expired.push(id.clone());
            }
        }
        expired
    }

    /// Cancel any pending timed effect on `id`.
    pub fn cancel_effects(&mut self, id: &PeerId) {
        if let Some(p) = self.participants.get_mut(id) {
            p.clear_effect();
        }
    }

    /// Close out the current round: every non-tagger scores one point for
    /// surviving, effects and power-ups are cleared, the round advances.
    pub fn reset_round(&mut self) {
        for p in self.participants.values_mut() {
            if !p.is_tagger {
                p.score += 1;
            }
            p.clear_effect();
            p.velocity = Vec2::ZERO;
        }
        self.powerups.clear();
        self.round += 1;
    }

    /// Tear the room down to an empty, awaiting state.
    pub fn clear(&mut self) {
        self.participants.clear();
        self.powerups.clear();
        self.last_seen_seq.clear();
        self.tagger = None;
        self.host = None;
        self.round = 1;
        self.state = RoomState::AwaitingSnapshot;
    }

    /// Portable view of the room. Local timestamps become remaining
    /// durations so the receiver can rebase them on its own clock.
    pub fn snapshot(&self, now: Millis, round_remaining_ms: Millis) -> RoomSnapshot {
        RoomSnapshot {
            participants: self
                .participants
                .values()
                .map(|p| ParticipantSnapshot {
                    peer_id: p.peer_id.clone(),
                    x: p.position.x,
                    y: p.position.y,
                    effect: if p.effect_expiry.is_some() {
                        p.active_effect
                    } else {
                        Effect::None
                    },
                    effect_remaining_ms: p.effect_expiry.map(|t| t.saturating_sub(now)),
                    score: p.score,
                })
                .collect(),
            tagger: self.tagger.clone(),
            host: self.host.clone(),
            round: self.round,
            round_remaining_ms,
            powerups: self
                .field_powerups(now)
                .map(|p| PowerUpSnapshot {
                    id: p.id.clone(),
                    kind: p.kind,
                    x: p.position.x,
                    y: p.position.y,
                    ttl_ms: p.expires_at.saturating_sub(now),
                })
                .collect(),
            seqs: self
                .last_seen_seq
                .iter()
                .map(|(id, &seq)| (id.clone(), seq))
                .collect(),
        }
    }

    /// Replace the room with a snapshot from `sender`. The local participant
    /// keeps its own position and effect; everything else is overwritten.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &RoomSnapshot,
        local: &PeerId,
        sender: &PeerId,
        sender_seq: u64,
        now: Millis,
    ) {
        let local_state = self.participants.remove(local);
        self.participants.clear();
        for entry in &snapshot.participants {
            let mut p = Participant::new(
                entry.peer_id.clone(),
                self.config.world.clamp(Vec2::new(entry.x, entry.y)),
            );
            p.score = entry.score;
            if let Some(remaining) = entry.effect_remaining_ms {
                let limit = match entry.effect {
                    Effect::Speed => {
                        p.speed_multiplier = SPEED_MULTIPLIER;
                        Some(SPEED_DURATION_MS)
                    },
                    Effect::Invisible => {
                        p.alpha = INVISIBLE_ALPHA;
                        Some(INVISIBLE_DURATION_MS)
                    },
                    _ => None,
                };
                if let Some(limit) = limit {
                    p.active_effect = entry.effect;
                    p.effect_expiry = Some(now.saturating_add(remaining.min(limit)));
                }
            }
            self.participants.insert(entry.peer_id.clone(), p);
        }
        if let Some(mut own) = local_state {
            if let Some(entry) = snapshot.participants.iter().find(|e| &e.peer_id == local) {
                own.score = entry.score;
            }
            self.participants.insert(local.clone(), own);
        }

        self.powerups.clear();
        for pu in &snapshot.powerups {
            self.powerups.insert(
                pu.id.clone(),
                PowerUp {
                    id: pu.id.clone(),
                    kind: pu.kind,
                    position: Vec2::new(pu.x, pu.y),
                    claimed_by: None,
                    expires_at: now.saturating_add(pu.ttl_ms.min(self.config.powerup_ttl_ms)),
                },
            );
        }

        for (id, &seq) in &snapshot.seqs {
            if id == local {
                continue;
            }
            let entry = self.last_seen_seq.entry(id.clone()).or_insert(0);
            *entry = (*entry).max(seq);
        }
        self.last_seen_seq.insert(sender.clone(), sender_seq);

        self.round = snapshot.round;
        self.host = snapshot.host.clone().filter(|h| self.participants.contains_key(h));
        self.state = RoomState::Active;
        let tagger = snapshot
            .tagger
            .clone()
            .or_else(|| self.participants.keys().next().cloned());
        self.set_tagger(tagger);
    }
}

/// Participant entry in a [`RoomSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
    pub peer_id: PeerId,
    pub x: f32,
    pub y: f32,
    pub effect: Effect,
    pub effect_remaining_ms: Option<Millis>,
    pub score: i32,
}

/// Unclaimed power-up entry in a [`RoomSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerUpSnapshot {
    pub id: PowerUpId,
    pub kind: PowerUpKind,
    pub x: f32,
    pub y: f32,
    pub ttl_ms: Millis,
}

/// Full room state sent in reply to a `join`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub participants: Vec<ParticipantSnapshot>,
    pub tagger: Option<PeerId>,
    pub host: Option<PeerId>,
    pub round: u32,
    pub round_remaining_ms: Millis,
    pub powerups: Vec<PowerUpSnapshot>,
    pub seqs: BTreeMap<PeerId, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_room() -> Room {
        Room::new(RoomConfig::default(), RoomState::Active)
    }

    #[test]
    fn first_participant_becomes_tagger() {
        let mut room = active_room();
        room.add_participant("b".into(), Vec2::new(1.0, 1.0));
        room.add_participant("a".into(), Vec2::new(2.0, 2.0));
        assert!(room.is_tagger(&"b".into()));
        assert_eq!(room.tagger_count(), 1);
    }

    #[test]
    fn awaiting_room_does_not_pick_tagger() {
        let mut room = Room::new(RoomConfig::default(), RoomState::AwaitingSnapshot);
        room.add_participant("a".into(), Vec2::ZERO);
        assert!(room.tagger().is_none());
        assert_eq!(room.tagger_count(), 0);
    }

    #[test]
    fn positions_are_clamped_to_world() {
        let mut room = active_room();
        room.add_participant("a".into(), Vec2::new(-50.0, 9000.0));
        assert_eq!(
            room.participant(&"a".into()).unwrap().position,
            Vec2::new(0.0, 600.0)
        );
    }

    #[test]
    fn removing_tagger_hands_off_to_smallest_id() {
        let mut room = active_room();
        for id in ["m", "z", "c"] {
            room.add_participant(id.into(), Vec2::ZERO);
        }
        room.set_host(Some("m".into()));
        room.remove_participant(&"m".into());
        assert!(room.is_tagger(&"c".into()));
        assert!(room.is_host(&"c".into()));
        assert_eq!(room.tagger_count(), 1);
    }

    #[test]
    fn accept_seq_is_strictly_monotonic() {
        let mut room = active_room();
        let a = PeerId::from("a");
        assert!(room.accept_seq(&a, 3));
        assert!(!room.accept_seq(&a, 3));
        assert!(!room.accept_seq(&a, 2));
        assert!(room.accept_seq(&a, 4));
        assert_eq!(room.last_seen_seq(&a), Some(4));
    }

    #[test]
    fn removed_peer_keeps_its_high_water_mark() {
        let mut room = active_room();
        let a = PeerId::from("a");
        room.add_participant(a.clone(), Vec2::ZERO);
        assert!(room.accept_seq(&a, 9));
        room.remove_participant(&a);
        assert_eq!(room.last_seen_seq(&a), Some(9));
        assert!(!room.accept_seq(&a, 1));
        room.clear();
        assert_eq!(room.last_seen_seq(&a), None);
    }

    #[test]
    fn reset_round_scores_survivors() {
        let mut room = active_room();
        room.add_participant("a".into(), Vec2::ZERO);
        room.add_participant("b".into(), Vec2::ZERO);
        room.participant_mut(&"b".into()).unwrap().effect_expiry = Some(99);
        room.reset_round();
        assert_eq!(room.participant(&"a".into()).unwrap().score, 0);
        assert_eq!(room.participant(&"b".into()).unwrap().score, 1);
        assert_eq!(room.participant(&"b".into()).unwrap().effect_expiry, None);
        assert_eq!(room.round(), 2);
    }

    #[test]
    fn expire_effects_only_touches_due_participants() {
        let mut room = active_room();
        room.add_participant("a".into(), Vec2::ZERO);
        room.add_participant("b".into(), Vec2::ZERO);
        room.participant_mut(&"a".into()).unwrap().effect_expiry = Some(100);
        room.participant_mut(&"b".into()).unwrap().effect_expiry = Some(200);
        assert_eq!(room.expire_effects(150), vec![PeerId::from("a")]);
        assert!(room.participant(&"b".into()).unwrap().effect_expiry.is_some());
    }

    #[test]
    fn expire_effects_clears_one_shot_markers() {
        let mut room = active_room();
        room.add_participant("a".into(), Vec2::ZERO);
        room.participant_mut(&"a".into()).unwrap().active_effect = Effect::Teleport;
        assert_eq!(room.expire_effects(0), vec![PeerId::from("a")]);
        assert_eq!(room.participant(&"a".into()).unwrap().active_effect, Effect::None);
    }

    #[test]
    fn snapshot_durations_are_clamped_to_limits() {
        let snap = RoomSnapshot {
            participants: vec![
                ParticipantSnapshot {
                    peer_id: "h".into(),
                    x: 0.0,
                    y: 0.0,
                    effect: Effect::Speed,
                    effect_remaining_ms: Some(u64::MAX),
                    score: 0,
                },
                ParticipantSnapshot {
                    peer_id: "k".into(),
                    x: 0.0,
                    y: 0.0,
                    effect: Effect::Freeze,
                    effect_remaining_ms: Some(u64::MAX),
                    score: 0,
                },
            ],
            tagger: Some("h".into()),
            host: Some("h".into()),
            round: 1,
            round_remaining_ms: u64::MAX,
            powerups: vec![PowerUpSnapshot {
                id: "p1".into(),
                kind: PowerUpKind::Invisible,
                x: 60.0,
                y: 60.0,
                ttl_ms: u64::MAX,
            }],
            seqs: BTreeMap::new(),
        };
        let mut joiner = Room::new(RoomConfig::default(), RoomState::AwaitingSnapshot);
        joiner.apply_snapshot(&snap, &"j".into(), &"h".into(), 1, u64::MAX - 10);

        let h = joiner.participant(&"h".into()).unwrap();
        assert_eq!(h.effect_expiry, Some(u64::MAX));
        let k = joiner.participant(&"k".into()).unwrap();
        assert_eq!((k.active_effect, k.effect_expiry), (Effect::None, None));
        assert_eq!(joiner.powerup(&"p1".into()).unwrap().expires_at, u64::MAX);

        joiner.apply_snapshot(&snap, &"j".into(), &"h".into(), 2, 1_000);
        let h = joiner.participant(&"h".into()).unwrap();
        assert_eq!(h.effect_expiry, Some(1_000 + SPEED_DURATION_MS));
        assert_eq!(joiner.powerup(&"p1".into()).unwrap().expires_at, 16_000);
    }

    #[test]
    fn snapshot_rebases_timers_on_receiver_clock() {
        let mut host = active_room();
        host.add_participant("h".into(), Vec2::new(100.0, 100.0));
        host.add_participant("j".into(), Vec2::new(200.0, 200.0));
        host.set_host(Some("h".into()));
        host.accept_seq(&"j".into(), 1);
        let h = host.participant_mut(&"h".into()).unwrap();
        h.active_effect = Effect::Speed;
        h.effect_expiry = Some(1_500);
        host.insert_powerup(PowerUp {
            id: "p1".into(),
            kind: PowerUpKind::Speed,
            position: Vec2::new(60.0, 60.0),
            claimed_by: None,
            expires_at: 3_000,
        });
        let snap = host.snapshot(1_000, 170_000);

        let mut joiner = Room::new(RoomConfig::default(), RoomState::AwaitingSnapshot);
        joiner.add_participant("j".into(), Vec2::new(5.0, 5.0));
        joiner.apply_snapshot(&snap, &"j".into(), &"h".into(), 7, 50_000);

        assert_eq!(joiner.state(), RoomState::Active);
        assert!(joiner.is_tagger(&"h".into()));
        assert!(joiner.is_host(&"h".into()));
        assert_eq!(
            joiner.participant(&"h".into()).unwrap().effect_expiry,
            Some(50_500)
        );
        assert_eq!(
            joiner.participant(&"j".into()).unwrap().position,
            Vec2::new(5.0, 5.0)
        );
        assert_eq!(joiner.powerup(&"p1".into()).unwrap().expires_at, 52_000);
        assert_eq!(joiner.last_seen_seq(&"h".into()), Some(7));
        assert_eq!(joiner.last_seen_seq(&"j".into()), None);
    }
}
