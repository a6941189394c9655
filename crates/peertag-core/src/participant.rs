use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Vec2;
use crate::powerup::Effect;
use crate::time::Millis;

/// Base movement speed in pixels per second.
pub const BASE_SPEED: f32 = 200.0;

/// Opaque peer identifier assigned by the transport layer.
///
/// Ordering is plain lexicographic string ordering; tag-claim tie-breaks
/// and tagger/host succession depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A peer's last-known state in the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub peer_id: PeerId,
    pub position: Vec2,
    /// Render hint; FREEZE zeroes it.
    pub velocity: Vec2,
    pub is_tagger: bool,
    pub active_effect: Effect,
    pub effect_expiry: Option<Millis>,
    pub speed_multiplier: f32,
    pub alpha: f32,
    pub score: i32,
}

impl Participant {
    pub fn new(peer_id: PeerId, position: Vec2) -> Self {
        Self {
            peer_id,
            position,
            velocity: Vec2::ZERO,
            is_tagger: false,
            active_effect: Effect::None,
            effect_expiry: None,
            speed_multiplier: 1.0,
            alpha: 1.0,
            score: 0,
        }
    }

    /// Current movement speed with any SPEED multiplier applied.
    pub fn speed(&self) -> f32 {
        BASE_SPEED * self.speed_multiplier
    }

    /// Timed effects are due at their expiry; one-shot markers are due at
    /// once.
    pub fn effect_expired(&self, now: Millis) -> bool {
        match self.effect_expiry {
            Some(t) => t <= now,
            None => self.active_effect != Effect::None,
        }
    }

    /// Drop any timed effect and restore the render defaults.
    pub fn clear_effect(&mut self) {
        self.active_effect = Effect::None;
        self.effect_expiry = None;
        self.speed_multiplier = 1.0;
        self.alpha = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_ids_order_lexicographically() {
        let mut ids = vec![PeerId::from("b"), PeerId::from("aa"), PeerId::from("a")];
        ids.sort();
        assert_eq!(ids, vec!["a".into(), "aa".into(), PeerId::from("b")]);
    }

    #[test]
    fn clear_effect_restores_defaults() {
        let mut p = Participant::new("a".into(), Vec2::new(1.0, 2.0));
        p.active_effect = Effect::Speed;
        p.effect_expiry = Some(10);
        p.speed_multiplier = 2.0;
        p.alpha = 0.3;
        assert!(p.effect_expired(10));
        p.clear_effect();
        assert_eq!(p.active_effect, Effect::None);
        assert_eq!(p.speed(), BASE_SPEED);
        assert_eq!(p.alpha, 1.0);
        assert!(!p.effect_expired(u64::MAX));
    }
}
