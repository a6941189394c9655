use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Rect, Vec2};
use crate::participant::{Participant, PeerId};
use crate::time::Millis;

/// SPEED doubles base speed (200 -> 400).
pub const SPEED_MULTIPLIER: f32 = 2.0;
pub const SPEED_DURATION_MS: Millis = 3_000;
/// Render alpha while INVISIBLE is active.
pub const INVISIBLE_ALPHA: f32 = 0.3;
pub const INVISIBLE_DURATION_MS: Millis = 5_000;

/// Power-up kinds that can be spawned on the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerUpKind {
    Speed,
    Freeze,
    Invisible,
    Teleport,
}

impl PowerUpKind {
    pub const ALL: [PowerUpKind; 4] = [
        PowerUpKind::Speed,
        PowerUpKind::Freeze,
        PowerUpKind::Invisible,
        PowerUpKind::Teleport,
    ];

    /// Wall-clock duration of the effect. `None` for one-shot effects.
    pub fn duration_ms(self) -> Option<Millis> {
        match self {
            Self::Speed => Some(SPEED_DURATION_MS),
            Self::Invisible => Some(INVISIBLE_DURATION_MS),
            Self::Freeze | Self::Teleport => None,
        }
    }
}

/// Effect currently attached to a participant. FREEZE and TELEPORT are
/// one-shot markers with no expiry and are cleared by the next sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Effect {
    #[default]
    None,
    Speed,
    Freeze,
    Invisible,
    Teleport,
}

/// Host-assigned power-up identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PowerUpId(pub String);

impl PowerUpId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl From<&str> for PowerUpId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for PowerUpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A power-up on the field. Claimed power-ups stay in the room's ledger
/// until the round ends so late claims can be answered with `StaleClaim`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerUp {
    pub id: PowerUpId,
    pub kind: PowerUpKind,
    pub position: Vec2,
    pub claimed_by: Option<PeerId>,
    pub expires_at: Millis,
}

impl PowerUp {
    /// Unclaimed and past its timeout.
    pub fn is_expired(&self, now: Millis) -> bool {
        self.claimed_by.is_none() && self.expires_at <= now
    }

    pub fn is_claimable(&self, now: Millis) -> bool {
        self.claimed_by.is_none() && now < self.expires_at
    }
}

/// Apply the effect of `kind` on behalf of `claimant`.
///
/// FREEZE touches every other participant; the rest only touch the claimant.
/// FREEZE and TELEPORT are one-shot and never replace a running timed effect.
pub fn apply_effect(
    participants: &mut BTreeMap<PeerId, Participant>,
    claimant: &PeerId,
    power_up: &PowerUp,
    teleport_area: &Rect,
    now: Millis,
) {
    match power_up.kind {
        PowerUpKind::Freeze => {
            for (id, p) in participants.iter_mut() {
                if id != claimant {
                    p.velocity = Vec2::ZERO;
                }
            }
            if let Some(p) = participants.get_mut(claimant) {
                mark_one_shot(p, Effect::Freeze);
            }
        },
        PowerUpKind::Speed => {
            if let Some(p) = participants.get_mut(claimant) {
                p.active_effect = Effect::Speed;
                p.speed_multiplier = SPEED_MULTIPLIER;
                p.alpha = 1.0;
                p.effect_expiry = power_up.kind.duration_ms().map(|d| now.saturating_add(d));
            }
        },
        PowerUpKind::Invisible => {
            if let Some(p) = participants.get_mut(claimant) {
                p.active_effect = Effect::Invisible;
                p.speed_multiplier = 1.0;
                p.alpha = INVISIBLE_ALPHA;
                p.effect_expiry = power_up.kind.duration_ms().map(|d| now.saturating_add(d));
            }
        },
        PowerUpKind::Teleport => {
            if let Some(p) = participants.get_mut(claimant) {
                mark_one_shot(p, Effect::Teleport);
                p.position = teleport_target(&power_up.id, claimant, teleport_area);
            }
        },
    }
}

fn mark_one_shot(p: &mut Participant, effect: Effect) {
    if p.effect_expiry.is_none() {
        p.active_effect = effect;
    }
}

/// Destination of a TELEPORT claim. Seeded from the power-up and claimant
/// ids so every peer relocates the claimant to the same spot.
pub fn teleport_target(id: &PowerUpId, claimant: &PeerId, area: &Rect) -> Vec2 {
    let seed = fnv1a(id.0.as_bytes()) ^ fnv1a(claimant.as_str().as_bytes()).rotate_left(32);
    let mut rng = StdRng::seed_from_u64(seed);
    Vec2::new(
        rng.random_range(area.min_x..=area.max_x),
        rng.random_range(area.min_y..=area.max_y),
    )
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawned(kind: PowerUpKind) -> PowerUp {
        PowerUp {
            id: "p1".into(),
            kind,
            position: Vec2::new(100.0, 100.0),
            claimed_by: None,
            expires_at: 10_000,
        }
    }

    fn two_players() -> BTreeMap<PeerId, Participant> {
        let mut map = BTreeMap::new();
        for (id, x) in [("a", 10.0), ("b", 20.0)] {
            let mut p = Participant::new(id.into(), Vec2::new(x, x));
            p.velocity = Vec2::new(200.0, 0.0);
            map.insert(PeerId::from(id), p);
        }
        map
    }

    const AREA: Rect = Rect::new(100.0, 100.0, 700.0, 500.0);

    #[test]
    fn speed_sets_timed_multiplier() {
        let mut players = two_players();
        apply_effect(&mut players, &"a".into(), &spawned(PowerUpKind::Speed), &AREA, 1_000);
        let a = &players[&PeerId::from("a")];
        assert_eq!(a.speed_multiplier, SPEED_MULTIPLIER);
        assert_eq!(a.effect_expiry, Some(4_000));
        assert_eq!(a.speed(), 400.0);
    }

    #[test]
    fn freeze_zeroes_others_only() {
        let mut players = two_players();
        apply_effect(&mut players, &"a".into(), &spawned(PowerUpKind::Freeze), &AREA, 0);
        assert_eq!(players[&PeerId::from("a")].velocity, Vec2::new(200.0, 0.0));
        assert_eq!(players[&PeerId::from("b")].velocity, Vec2::ZERO);
        let a = &players[&PeerId::from("a")];
        assert_eq!(a.effect_expiry, None);
        assert_eq!(a.active_effect, Effect::Freeze);
        assert!(a.effect_expired(0));
    }

    #[test]
    fn one_shot_effects_keep_running_timed_effect() {
        let mut players = two_players();
        let a = PeerId::from("a");
        apply_effect(&mut players, &a, &spawned(PowerUpKind::Speed), &AREA, 0);
        apply_effect(&mut players, &a, &spawned(PowerUpKind::Teleport), &AREA, 100);
        apply_effect(&mut players, &a, &spawned(PowerUpKind::Freeze), &AREA, 200);
        assert_eq!(players[&a].active_effect, Effect::Speed);
        assert_eq!(players[&a].effect_expiry, Some(3_000));
        assert_eq!(players[&a].speed_multiplier, SPEED_MULTIPLIER);
    }

    #[test]
    fn timed_effect_expiry_saturates() {
        let mut players = two_players();
        apply_effect(&mut players, &"b".into(), &spawned(PowerUpKind::Invisible), &AREA, u64::MAX - 1);
        assert_eq!(players[&PeerId::from("b")].effect_expiry, Some(u64::MAX));
    }

    #[test]
    fn invisible_lowers_alpha_for_five_seconds() {
        let mut players = two_players();
        apply_effect(&mut players, &"b".into(), &spawned(PowerUpKind::Invisible), &AREA, 500);
        let b = &players[&PeerId::from("b")];
        assert_eq!(b.alpha, INVISIBLE_ALPHA);
        assert_eq!(b.effect_expiry, Some(5_500));
    }

    #[test]
    fn teleport_is_deterministic_and_bounded() {
        let first = teleport_target(&"p1".into(), &"a".into(), &AREA);
        let again = teleport_target(&"p1".into(), &"a".into(), &AREA);
        assert_eq!(first, again);
        assert!(AREA.contains(first));

        let mut players = two_players();
        apply_effect(&mut players, &"a".into(), &spawned(PowerUpKind::Teleport), &AREA, 0);
        assert_eq!(players[&PeerId::from("a")].position, first);
    }

    #[test]
    fn claimed_power_up_never_expires() {
        let mut pu = spawned(PowerUpKind::Speed);
        assert!(pu.is_claimable(9_999));
        assert!(pu.is_expired(10_000));
        pu.claimed_by = Some("a".into());
        assert!(!pu.is_expired(20_000));
        assert!(!pu.is_claimable(0));
    }

    #[test]
    fn durations_match_kinds() {
        assert_eq!(PowerUpKind::Speed.duration_ms(), Some(3_000));
        assert_eq!(PowerUpKind::Invisible.duration_ms(), Some(5_000));
        assert_eq!(PowerUpKind::Freeze.duration_ms(), None);
        assert_eq!(PowerUpKind::Teleport.duration_ms(), None);
    }
}
