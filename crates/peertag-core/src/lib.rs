pub mod broadcaster;
pub mod geometry;
pub mod net;
pub mod participant;
pub mod powerup;
pub mod reconciler;
pub mod registry;
pub mod room;
pub mod round;
pub mod session;
pub mod spawner;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::geometry::Vec2;
    use crate::net::messages::{Message, Payload, PositionMsg, PowerUpClaimMsg, TagClaimMsg};
    use crate::net::protocol::{WireFormat, decode_message, encode_message};
    use crate::participant::PeerId;
    use crate::registry::{PeerConnection, SendError};
    use crate::room::{Room, RoomConfig, RoomState};
    use crate::session::{Inbound, PeerSession, SessionConfig, TickReport};
    use crate::time::Millis;

    /// In-memory connection that records every frame sent through it.
    #[derive(Clone, Default)]
    pub struct MemoryConnection {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        closed: Arc<AtomicBool>,
    }

    impl MemoryConnection {
        /// Make every later send fail.
        pub fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        /// Remove and return the frames sent so far.
        pub fn take_frames(&self) -> Vec<Vec<u8>> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }

        /// Frames sent so far, decoded. Leaves them in place.
        pub fn decoded(&self, format: WireFormat) -> Vec<Message> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|f| decode_message(f, format).unwrap())
                .collect()
        }
    }

    impl PeerConnection for MemoryConnection {
        fn send(&self, data: &[u8]) -> Result<(), SendError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(SendError::new("channel closed"));
            }
            self.sent.lock().unwrap().push(data.to_vec());
            Ok(())
        }
    }

    /// Active room holding `ids` in order; the first becomes tagger.
    pub fn make_room(ids: &[&str]) -> Room {
        let mut room = Room::new(RoomConfig::default(), RoomState::Active);
        for id in ids {
            room.add_participant((*id).into(), Vec2::new(400.0, 300.0));
        }
        room
    }

    pub fn position(peer: &str, seq: u64, x: f32, y: f32) -> Message {
        Message::new(peer.into(), seq, Payload::Position(PositionMsg { x, y }))
    }

    pub fn tag_claim(claimant: &str, seq: u64, target: &str) -> Message {
        Message::new(
            claimant.into(),
            seq,
            Payload::TagClaim(TagClaimMsg {
                target: target.into(),
            }),
        )
    }

    pub fn powerup_claim(peer: &str, seq: u64, id: &str) -> Message {
        Message::new(
            peer.into(),
            seq,
            Payload::PowerUpClaim(PowerUpClaimMsg {
                power_up_id: id.into(),
            }),
        )
    }

    /// JSON frame carrying a position update.
    pub fn position_frame(peer: &str, seq: u64, x: f32, y: f32) -> Vec<u8> {
        encode_message(&position(peer, seq, x, y), WireFormat::Json).unwrap()
    }

    /// A fully meshed set of sessions wired with [`MemoryConnection`]s.
    /// Frames only move on [`Mesh::deliver`], so tests control interleaving.
    #[derive(Default)]
    pub struct Mesh {
        pub config: SessionConfig,
        pub sessions: BTreeMap<PeerId, PeerSession<MemoryConnection>>,
        links: BTreeMap<(PeerId, PeerId), MemoryConnection>,
    }

    impl Mesh {
        pub fn new(config: SessionConfig) -> Self {
            Self {
                config,
                ..Self::default()
            }
        }

        pub fn session(&self, id: &str) -> &PeerSession<MemoryConnection> {
            &self.sessions[&PeerId::from(id)]
        }

        pub fn session_mut(&mut self, id: &str) -> &mut PeerSession<MemoryConnection> {
            self.sessions.get_mut(&PeerId::from(id)).unwrap()
        }

        /// The channel `from` uses to send to `to`.
        pub fn link(&self, from: &str, to: &str) -> &MemoryConnection {
            &self.links[&(PeerId::from(from), PeerId::from(to))]
        }

        pub fn create(&mut self, id: &str, now: Millis) {
            let session = PeerSession::create(id.into(), self.config.clone(), 1, now);
            self.sessions.insert(id.into(), session);
        }

        /// Start `id` joining through `via`. The room activates once the
        /// snapshot is delivered and ticked.
        pub fn join(&mut self, id: &str, via: &str, now: Millis) {
            let seed = self.sessions.len() as u64 + 1;
            let session = PeerSession::join(id.into(), self.config.clone(), seed, now);
            self.sessions.insert(id.into(), session);
            self.dial(&id.into(), &via.into());
        }

        fn dial(&mut self, from: &PeerId, to: &PeerId) {
            let out = MemoryConnection::default();
            let back = MemoryConnection::default();
            self.links.insert((from.clone(), to.clone()), out.clone());
            self.links.insert((to.clone(), from.clone()), back.clone());
            if let Some(s) = self.sessions.get_mut(from) {
                s.connect(to.clone(), out);
            }
            if let Some(s) = self.sessions.get_mut(to) {
                s.accept(from.clone(), back);
            }
        }

        /// Move every sent frame into its receiver's inbound queue.
        pub fn deliver(&mut self) {
            for ((from, to), link) in &self.links {
                let Some(session) = self.sessions.get_mut(to) else {
                    continue;
                };
                for data in link.take_frames() {
                    session.enqueue(Inbound::Frame {
                        from: from.clone(),
                        data,
                    });
                }
            }
        }

        /// Tick every session and dial whatever the reports ask for.
        pub fn tick(&mut self, now: Millis) -> BTreeMap<PeerId, TickReport> {
            let reports: BTreeMap<PeerId, TickReport> = self
                .sessions
                .iter_mut()
                .map(|(id, s)| (id.clone(), s.tick(now)))
                .collect();
            for (id, report) in &reports {
                for peer in &report.dial {
                    self.dial(id, peer);
                }
            }
            reports
        }

        /// Tick then deliver, `rounds` times, advancing `step_ms` each time.
        pub fn run(&mut self, start: Millis, step_ms: Millis, rounds: usize) -> Millis {
            let mut now = start;
            for _ in 0..rounds {
                self.tick(now);
                self.deliver();
                now += step_ms;
            }
            now
        }
    }
}
