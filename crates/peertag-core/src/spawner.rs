use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geometry::Rect;
use crate::net::messages::PowerUpSpawnMsg;
use crate::powerup::{PowerUpId, PowerUpKind};
use crate::room::{Room, RoomConfig};
use crate::time::Millis;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnerState {
    Empty,
    Spawned { id: PowerUpId, expires_at: Millis },
}

/// Authoritative power-up spawner, run only by the room host.
///
/// A timer fires every `powerup_spawn_interval_ms`; if nothing this spawner
/// placed is still on the field, a new power-up of uniform random kind is
/// placed at a uniform random point in `spawn_area`. The state returns to
/// `Empty` once the power-up is claimed or times out.
#[derive(Debug)]
pub struct PowerUpSpawner {
    interval_ms: Millis,
    ttl_ms: Millis,
    area: Rect,
    next_fire_at: Millis,
    state: SpawnerState,
    rng: StdRng,
}

impl PowerUpSpawner {
    pub fn new(config: &RoomConfig, seed: u64, now: Millis) -> Self {
        Self {
            interval_ms: config.powerup_spawn_interval_ms.max(1),
            ttl_ms: config.powerup_ttl_ms,
            area: config.spawn_area,
            next_fire_at: now.saturating_add(config.powerup_spawn_interval_ms),
            state: SpawnerState::Empty,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn state(&self) -> &SpawnerState {
        &self.state
    }

    /// Restart the timer, e.g. after being promoted to host.
    pub fn reset(&mut self, now: Millis) {
        self.state = SpawnerState::Empty;
        self.next_fire_at = now.saturating_add(self.interval_ms);
    }

    pub fn poll(&mut self, now: Millis, room: &Room) -> Option<PowerUpSpawnMsg> {
        if let SpawnerState::Spawned { id, expires_at } = &self.state {
            let gone = room
                .powerup(id)
                .is_none_or(|p| p.claimed_by.is_some() || p.is_expired(now));
            if gone || now >= *expires_at {
                self.state = SpawnerState::Empty;
            }
        }

        if now < self.next_fire_at {
            return None;
        }
        // Missed firings are skipped rather than replayed.
        while self.next_fire_at <= now {
            self.next_fire_at += self.interval_ms;
        }
        if self.state != SpawnerState::Empty {
            return None;
        }

        let kind = PowerUpKind::ALL[self.rng.random_range(0..PowerUpKind::ALL.len())];
        let x = self.rng.random_range(self.area.min_x..=self.area.max_x);
        let y = self.rng.random_range(self.area.min_y..=self.area.max_y);
        let id = PowerUpId::generate();
        self.state = SpawnerState::Spawned {
            id: id.clone(),
            expires_at: now.saturating_add(self.ttl_ms),
        };
        tracing::debug!(id = %id, ?kind, x, y, "Spawning power-up");
        Some(PowerUpSpawnMsg {
            id,
            kind,
            x,
            y,
            ttl_ms: self.ttl_ms,
        })
    }
}
