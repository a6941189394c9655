use std::collections::BTreeMap;

use crate::participant::PeerId;

/// A send attempt on a dead or closed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendError {
    pub reason: String,
}

impl SendError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer unreachable: {}", self.reason)
    }
}

impl std::error::Error for SendError {}

/// Outbound half of a data channel to one peer. Sends are fire-and-forget:
/// `Ok` means the frame was handed to the transport, not that it arrived.
pub trait PeerConnection {
    fn send(&self, data: &[u8]) -> Result<(), SendError>;
}

/// Connection handles keyed by peer id. The local peer is never registered.
pub struct PeerRegistry<C> {
    local: PeerId,
    connections: BTreeMap<PeerId, C>,
}

impl<C: PeerConnection> PeerRegistry<C> {
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            connections: BTreeMap::new(),
        }
    }

    pub fn local(&self) -> &PeerId {
        &self.local
    }

    /// Register (or replace) the handle for `peer`. Returns true when the
    /// peer was not registered before.
    pub fn register(&mut self, peer: PeerId, handle: C) -> bool {
        if peer == self.local {
            tracing::debug!(peer = %peer, "Ignoring registration of local peer");
            return false;
        }
        self.connections.insert(peer, handle).is_none()
    }

    pub fn unregister(&mut self, peer: &PeerId) -> Option<C> {
        self.connections.remove(peer)
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.connections.contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.connections.keys()
    }

    /// Send to a single peer. A failed send unregisters the peer.
    pub fn send_to(&mut self, peer: &PeerId, data: &[u8]) -> Result<(), SendError> {
        let Some(conn) = self.connections.get(peer) else {
            return Err(SendError::new(format!("{peer} is not registered")));
        };
        if let Err(e) = conn.send(data) {
            tracing::warn!(peer = %peer, error = %e, "Send failed, unregistering peer");
            self.connections.remove(peer);
            return Err(e);
        }
        Ok(())
    }

    /// Send to every registered peer. Peers whose send fails are
    /// unregistered (no retry) and returned.
    pub fn broadcast(&mut self, data: &[u8]) -> Vec<PeerId> {
        let mut dead = Vec::new();
        for (peer, conn) in &self.connections {
            if let Err(e) = conn.send(data) {
                tracing::warn!(peer = %peer, error = %e, "Broadcast failed, unregistering peer");
                dead.push(peer.clone());
            }
        }
        for peer in &dead {
            self.connections.remove(peer);
        }
        dead
    }

    pub fn clear(&mut self) {
        self.connections.clear();
    }
}
