use crate::net::messages::RoundEndMsg;
use crate::time::Millis;

/// Countdown for the current round. Every peer keeps one so a promoted host
/// can take over mid-round; only the host acts on [`RoundClock::poll`].
#[derive(Debug, Clone)]
pub struct RoundClock {
    duration_ms: Millis,
    ends_at: Millis,
    fired: bool,
}

impl RoundClock {
    pub fn new(duration_ms: Millis, now: Millis) -> Self {
        Self {
            duration_ms,
            ends_at: now.saturating_add(duration_ms),
            fired: false,
        }
    }

    /// Start a fresh round at `now`.
    pub fn restart(&mut self, now: Millis) {
        self.resume(self.duration_ms, now);
    }

    /// Continue a round that has `remaining_ms` left, e.g. from a snapshot.
    /// Never longer than a full round.
    pub fn resume(&mut self, remaining_ms: Millis, now: Millis) {
        self.ends_at = now.saturating_add(remaining_ms.min(self.duration_ms));
        self.fired = false;
    }

    pub fn remaining_ms(&self, now: Millis) -> Millis {
        self.ends_at.saturating_sub(now)
    }

    /// Yields `RoundEnd` once when the countdown reaches zero. Stays quiet
    /// until restarted.
    pub fn poll(&mut self, now: Millis, round: u32) -> Option<RoundEndMsg> {
        if self.fired || now < self.ends_at {
            return None;
        }
        self.fired = true;
        Some(RoundEndMsg { round })
    }
}
