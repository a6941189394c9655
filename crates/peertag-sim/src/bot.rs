use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use peertag_core::geometry::Vec2;
use peertag_core::participant::PeerId;
use peertag_core::powerup::PowerUpId;
use peertag_core::reconciler::Outcome;
use peertag_core::registry::PeerConnection;
use peertag_core::room::{Room, RoomState};
use peertag_core::session::PeerSession;
use peertag_core::time::Millis;

use crate::config::BotConfig;

/// Runners ignore power-ups while the tagger is closer than this.
const DANGER_DISTANCE: f32 = 150.0;

/// What a bot decided to do this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct BotAction {
    pub heading: Vec2,
    pub claim_tag: Option<PeerId>,
    pub claim_powerup: Option<PowerUpId>,
}

/// Drives one local participant: the tagger chases the nearest runner,
/// runners flee and wander, and anyone grabs power-ups they touch.
#[derive(Debug)]
pub struct Bot {
    config: BotConfig,
    rng: StdRng,
    wander: Vec2,
    next_wander_at: Millis,
    was_tagger: bool,
    immune_until: Millis,
}

fn direction(from: Vec2, to: Vec2) -> Vec2 {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len < f32::EPSILON {
        Vec2::ZERO
    } else {
        Vec2::new(dx / len, dy / len)
    }
}

fn blend(a: Vec2, b: Vec2, weight_b: f32) -> Vec2 {
    let v = Vec2::new(
        a.x * (1.0 - weight_b) + b.x * weight_b,
        a.y * (1.0 - weight_b) + b.y * weight_b,
    );
    direction(Vec2::ZERO, v)
}

impl Bot {
    pub fn new(config: BotConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            wander: Vec2::ZERO,
            next_wander_at: 0,
            was_tagger: false,
            immune_until: 0,
        }
    }

    /// Decide a heading and any claims for `local`. Pure with respect to
    /// the room; only the bot's own timers and rng advance.
    pub fn decide(&mut self, room: &Room, local: &PeerId, now: Millis) -> Option<BotAction> {
        if room.state() != RoomState::Active {
            return None;
        }
        let me = room.participant(local)?;
        let is_tagger = room.is_tagger(local);
        if self.was_tagger && !is_tagger {
            self.immune_until = now + self.config.tag_cooldown_ms;
        }
        self.was_tagger = is_tagger;

        if now >= self.next_wander_at {
            let angle = self.rng.random_range(0.0..std::f32::consts::TAU);
            self.wander = Vec2::new(angle.cos(), angle.sin());
            self.next_wander_at = now + self.config.wander_ms;
        }

        let mut action = BotAction {
            heading: self.wander,
            claim_tag: None,
            claim_powerup: None,
        };

        if is_tagger {
            let prey = room
                .participants()
                .values()
                .filter(|p| p.peer_id != *local)
                .min_by(|a, b| {
                    me.position
                        .distance(a.position)
                        .total_cmp(&me.position.distance(b.position))
                });
            if let Some(prey) = prey {
                action.heading = direction(me.position, prey.position);
            }
        } else if let Some(tagger) = room.tagger().and_then(|id| room.participant(id)) {
            let gap = me.position.distance(tagger.position);
            if gap <= self.config.tag_radius && now >= self.immune_until {
                action.claim_tag = Some(tagger.peer_id.clone());
            }
            if gap < DANGER_DISTANCE {
                let away = direction(tagger.position, me.position);
                action.heading = blend(self.wander, away, 0.8);
            } else if let Some(target) = room
                .field_powerups(now)
                .min_by(|a, b| {
                    me.position
                        .distance(a.position)
                        .total_cmp(&me.position.distance(b.position))
                })
            {
                action.heading = direction(me.position, target.position);
            }
        }

        action.claim_powerup = room
            .field_powerups(now)
            .find(|p| me.position.distance(p.position) <= self.config.pickup_radius)
            .map(|p| p.id.clone());

        Some(action)
    }

    /// Run one step for the session's local participant: decide, issue
    /// claims, then move for `dt_ms`.
    pub fn drive<C: PeerConnection>(&mut self, session: &mut PeerSession<C>, now: Millis, dt_ms: Millis) {
        let local = session.local().clone();
        let Some(action) = self.decide(session.room(), &local, now) else {
            return;
        };
        if let Some(target) = &action.claim_tag
            && session.claim_tag(target) == Outcome::Deferred
        {
            tracing::debug!(peer = %local, target = %target, "Bot claims it was tagged");
            self.immune_until = now + self.config.tag_cooldown_ms;
        }
        if let Some(id) = &action.claim_powerup
            && session.claim_powerup(id, now) == Outcome::Applied
        {
            tracing::debug!(peer = %local, id = %id, "Bot picked up power-up");
        }
        session.set_velocity(action.heading);
        session.integrate(dt_ms);
    }
}
