use std::collections::BTreeMap;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use peertag_core::participant::PeerId;
use peertag_core::registry::{PeerConnection, SendError};

/// Events delivered to a peer task's inbox.
#[derive(Debug)]
pub enum PeerEvent {
    /// A frame from another peer's data channel.
    Frame { from: PeerId, data: Bytes },
    /// `from` opened a channel to us; `conn` is our way back.
    Opened { from: PeerId, conn: ChannelConnection },
    /// Stop ticking; queued frames stay unapplied.
    Pause,
    /// Stop: announce `leave` and exit.
    Shutdown,
}

/// One direction of an in-memory data channel. Sending never blocks; a full
/// inbox drops the frame, a closed inbox reports the peer unreachable.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    from: PeerId,
    tx: mpsc::Sender<PeerEvent>,
}

impl PeerConnection for ChannelConnection {
    fn send(&self, data: &[u8]) -> Result<(), SendError> {
        let event = PeerEvent::Frame {
            from: self.from.clone(),
            data: Bytes::copy_from_slice(data),
        };
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::debug!(from = %self.from, "Peer inbox full, frame dropped");
                Ok(())
            },
            Err(TrySendError::Closed(_)) => Err(SendError::new("inbox closed")),
        }
    }
}

/// Directory of every peer inbox in the simulation. Cloned into each peer
/// task up front so dialing needs no shared state.
#[derive(Debug, Clone, Default)]
pub struct Switchboard {
    inboxes: BTreeMap<PeerId, mpsc::Sender<PeerEvent>>,
}

impl Switchboard {
    /// Create an inbox for `peer`, returning its receiving end.
    pub fn add_peer(&mut self, peer: PeerId, capacity: usize) -> mpsc::Receiver<PeerEvent> {
        let (tx, rx) = mpsc::channel(capacity);
        self.inboxes.insert(peer, tx);
        rx
    }

    /// Sender-side handle for frames from `from` to `to`.
    pub fn connection(&self, from: &PeerId, to: &PeerId) -> Option<ChannelConnection> {
        self.inboxes.get(to).map(|tx| ChannelConnection {
            from: from.clone(),
            tx: tx.clone(),
        })
    }

    /// Open a channel from `from` to `to`: hand `to` its return handle and
    /// give `from` the outgoing one.
    pub fn open(&self, from: &PeerId, to: &PeerId) -> Result<ChannelConnection, SendError> {
        let (Some(out), Some(back)) = (self.connection(from, to), self.connection(to, from)) else {
            return Err(SendError::new(format!("{to} is not on the switchboard")));
        };
        out.tx
            .try_send(PeerEvent::Opened {
                from: from.clone(),
                conn: back,
            })
            .map_err(|e| SendError::new(format!("{to} did not accept: {e}")))?;
        Ok(out)
    }

    /// Pause every peer, then shut them all down. Pausing first keeps an
    /// early `leave` from being applied by a peer that has not stopped yet.
    pub async fn shutdown_all(&self) {
        for tx in self.inboxes.values() {
            let _ = tx.send(PeerEvent::Pause).await;
        }
        for tx in self.inboxes.values() {
            let _ = tx.send(PeerEvent::Shutdown).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_hands_back_channel_to_callee() {
        let mut board = Switchboard::default();
        let mut a_rx = board.add_peer("a".into(), 8);
        let mut b_rx = board.add_peer("b".into(), 8);

        let a_to_b = board.open(&"a".into(), &"b".into()).unwrap();
        let Some(PeerEvent::Opened { from, conn: b_to_a }) = b_rx.recv().await else {
            panic!("expected Opened");
        };
        assert_eq!(from, PeerId::from("a"));

        a_to_b.send(b"ping").unwrap();
        b_to_a.send(b"pong").unwrap();
        match b_rx.recv().await {
            Some(PeerEvent::Frame { from, data }) => {
                assert_eq!(from, PeerId::from("a"));
                assert_eq!(&data[..], b"ping");
            },
            other => panic!("unexpected {other:?}"),
        }
        match a_rx.recv().await {
            Some(PeerEvent::Frame { from, data }) => {
                assert_eq!(from, PeerId::from("b"));
                assert_eq!(&data[..], b"pong");
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_inbox_is_unreachable() {
        let mut board = Switchboard::default();
        let _a_rx = board.add_peer("a".into(), 8);
        let b_rx = board.add_peer("b".into(), 8);
        let conn = board.connection(&"a".into(), &"b".into()).unwrap();
        drop(b_rx);
        assert!(conn.send(b"x").is_err());
    }

    #[tokio::test]
    async fn full_inbox_drops_without_error() {
        let mut board = Switchboard::default();
        let _rx = board.add_peer("b".into(), 1);
        let conn = board.connection(&"a".into(), &"b".into()).unwrap();
        conn.send(b"1").unwrap();
        conn.send(b"2").unwrap();
    }

    #[test]
    fn unknown_peer_cannot_be_opened() {
        let mut board = Switchboard::default();
        let _rx = board.add_peer("a".into(), 8);
        assert!(board.open(&"a".into(), &"zz".into()).is_err());
    }
}
