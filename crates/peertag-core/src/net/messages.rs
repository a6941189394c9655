use serde::{Deserialize, Serialize};

use crate::participant::PeerId;
use crate::powerup::{PowerUpId, PowerUpKind};
use crate::room::RoomSnapshot;

/// Wire `type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Position,
    TagClaim,
    PowerUpClaim,
    Join,
    Leave,
    Snapshot,
    PowerUpSpawn,
    RoundEnd,
}

impl MessageType {
    pub const ALL: [MessageType; 8] = [
        MessageType::Position,
        MessageType::TagClaim,
        MessageType::PowerUpClaim,
        MessageType::Join,
        MessageType::Leave,
        MessageType::Snapshot,
        MessageType::PowerUpSpawn,
        MessageType::RoundEnd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::TagClaim => "tagClaim",
            Self::PowerUpClaim => "powerupClaim",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Snapshot => "snapshot",
            Self::PowerUpSpawn => "powerupSpawn",
            Self::RoundEnd => "roundEnd",
        }
    }

    /// Map a wire `type` string; unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionMsg {
    pub x: f32,
    pub y: f32,
}

/// Sent by the peer that was caught: `target` is the tagger it touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagClaimMsg {
    pub target: PeerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerUpClaimMsg {
    pub power_up_id: PowerUpId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinMsg {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerUpSpawnMsg {
    pub id: PowerUpId,
    pub kind: PowerUpKind,
    pub x: f32,
    pub y: f32,
    pub ttl_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEndMsg {
    /// The round that just finished.
    pub round: u32,
}

/// Typed message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Position(PositionMsg),
    TagClaim(TagClaimMsg),
    PowerUpClaim(PowerUpClaimMsg),
    Join(JoinMsg),
    Leave,
    Snapshot(Box<RoomSnapshot>),
    PowerUpSpawn(PowerUpSpawnMsg),
    RoundEnd(RoundEndMsg),
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Position(_) => MessageType::Position,
            Self::TagClaim(_) => MessageType::TagClaim,
            Self::PowerUpClaim(_) => MessageType::PowerUpClaim,
            Self::Join(_) => MessageType::Join,
            Self::Leave => MessageType::Leave,
            Self::Snapshot(_) => MessageType::Snapshot,
            Self::PowerUpSpawn(_) => MessageType::PowerUpSpawn,
            Self::RoundEnd(_) => MessageType::RoundEnd,
        }
    }
}

/// A message from one peer, stamped with its per-sender sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub peer_id: PeerId,
    pub seq: u64,
    pub payload: Payload,
}

impl Message {
    pub fn new(peer_id: PeerId, seq: u64, payload: Payload) -> Self {
        Self {
            peer_id,
            seq,
            payload,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }
}
