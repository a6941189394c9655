use crate::net::messages::{Message, Payload, PositionMsg};
use crate::participant::PeerId;
use crate::room::{Room, RoomState};
use crate::time::Millis;

/// Monotonic outbound sequence for one sender. Every message a peer emits
/// draws from the same counter.
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    next: u64,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        let seq = self.next;
        self.next += 1;
        seq
    }

    /// The last value handed out, or 0 before the first.
    pub fn current(&self) -> u64 {
        self.next - 1
    }
}

/// Fixed-rate emitter of the local participant's position. Best effort:
/// no ack, no retry, the next interval supersedes a lost frame.
#[derive(Debug, Clone)]
pub struct SyncBroadcaster {
    interval_ms: Millis,
    last_sent: Option<Millis>,
}

impl SyncBroadcaster {
    pub fn new(broadcast_hz: u32) -> Self {
        Self {
            interval_ms: 1000 / Millis::from(broadcast_hz.max(1)),
            last_sent: None,
        }
    }

    pub fn interval_ms(&self) -> Millis {
        self.interval_ms
    }

    pub fn poll(
        &mut self,
        now: Millis,
        room: &Room,
        local: &PeerId,
        seq: &mut SequenceCounter,
    ) -> Option<Message> {
        if room.state() != RoomState::Active {
            return None;
        }
        if self
            .last_sent
            .is_some_and(|last| now < last + self.interval_ms)
        {
            return None;
        }
        let me = room.participant(local)?;
        self.last_sent = Some(now);
        Some(Message::new(
            local.clone(),
            seq.next(),
            Payload::Position(PositionMsg {
                x: me.position.x,
                y: me.position.y,
            }),
        ))
    }
}
