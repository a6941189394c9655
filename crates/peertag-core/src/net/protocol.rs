use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::participant::PeerId;

use super::messages::{Message, MessageType, Payload};

/// Maximum encoded frame size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

/// Encoding used for frames on the data channel. All peers in a room must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Json,
    MessagePack,
}

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
    InvalidPayload {
        message_type: MessageType,
        reason: String,
    },
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::PayloadTooLarge(size) => {
                write!(
                    f,
                    "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})"
                )
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
            Self::InvalidPayload {
                message_type,
                reason,
            } => write!(f, "invalid {message_type} payload: {reason}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// `{type, peerId, seq, payload}` as it appears on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(rename = "peerId")]
    peer_id: PeerId,
    seq: u64,
    #[serde(default)]
    payload: Value,
}

fn to_value<T: Serialize>(payload: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))
}

fn from_value<T: DeserializeOwned>(
    message_type: MessageType,
    payload: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|e| ProtocolError::InvalidPayload {
        message_type,
        reason: e.to_string(),
    })
}

/// Encode a message into one frame.
pub fn encode_message(msg: &Message, format: WireFormat) -> Result<Vec<u8>, ProtocolError> {
    let payload = match &msg.payload {
        Payload::Position(m) => to_value(m)?,
        Payload::TagClaim(m) => to_value(m)?,
        Payload::PowerUpClaim(m) => to_value(m)?,
        Payload::Join(m) => to_value(m)?,
        Payload::Leave => Value::Object(serde_json::Map::new()),
        Payload::Snapshot(m) => to_value(m.as_ref())?,
        Payload::PowerUpSpawn(m) => to_value(m)?,
        Payload::RoundEnd(m) => to_value(m)?,
    };
    let envelope = Envelope {
        message_type: msg.message_type().as_str().to_string(),
        peer_id: msg.peer_id.clone(),
        seq: msg.seq,
        payload,
    };
    let bytes = match format {
        WireFormat::Json => serde_json::to_vec(&envelope)
            .map_err(|e| ProtocolError::SerializeError(e.to_string()))?,
        WireFormat::MessagePack => rmp_serde::to_vec_named(&envelope)
            .map_err(|e| ProtocolError::SerializeError(e.to_string()))?,
    };
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(bytes.len()));
    }
    Ok(bytes)
}

/// Decode one frame. Frames with an unrecognised `type` decode to
/// `Ok(None)` so newer peers can add message kinds.
pub fn decode_message(data: &[u8], format: WireFormat) -> Result<Option<Message>, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(data.len()));
    }
    let envelope: Envelope = match format {
        WireFormat::Json => serde_json::from_slice(data)
            .map_err(|e| ProtocolError::DeserializeError(e.to_string()))?,
        WireFormat::MessagePack => rmp_serde::from_slice(data)
            .map_err(|e| ProtocolError::DeserializeError(e.to_string()))?,
    };
    let Some(message_type) = MessageType::parse(&envelope.message_type) else {
        return Ok(None);
    };
    let payload = envelope.payload;
    let payload = match message_type {
        MessageType::Position => Payload::Position(from_value(message_type, payload)?),
        MessageType::TagClaim => Payload::TagClaim(from_value(message_type, payload)?),
        MessageType::PowerUpClaim => Payload::PowerUpClaim(from_value(message_type, payload)?),
        MessageType::Join => Payload::Join(from_value(message_type, payload)?),
        MessageType::Leave => Payload::Leave,
        MessageType::Snapshot => Payload::Snapshot(Box::new(from_value(message_type, payload)?)),
        MessageType::PowerUpSpawn => Payload::PowerUpSpawn(from_value(message_type, payload)?),
        MessageType::RoundEnd => Payload::RoundEnd(from_value(message_type, payload)?),
    };
    Ok(Some(Message {
        peer_id: envelope.peer_id,
        seq: envelope.seq,
        payload,
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::net::messages::{
        JoinMsg, PositionMsg, PowerUpClaimMsg, PowerUpSpawnMsg, RoundEndMsg, TagClaimMsg,
    };
    use crate::powerup::{Effect, PowerUpKind};
    use crate::room::{ParticipantSnapshot, PowerUpSnapshot, RoomSnapshot};

    fn msg(payload: Payload) -> Message {
        Message::new("peer-a".into(), 7, payload)
    }

    #[test]
    fn position_uses_documented_wire_shape() {
        let encoded = encode_message(
            &msg(Payload::Position(PositionMsg { x: 10.0, y: 20.5 })),
            WireFormat::Json,
        )
        .unwrap();
        let value: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "position",
                "peerId": "peer-a",
                "seq": 7,
                "payload": { "x": 10.0, "y": 20.5 }
            })
        );
    }

    #[test]
    fn decode_hand_written_tag_claim() {
        let raw = br#"{"type":"tagClaim","peerId":"A","seq":2,"payload":{"target":"B"}}"#;
        let decoded = decode_message(raw, WireFormat::Json).unwrap().unwrap();
        assert_eq!(decoded.peer_id, PeerId::from("A"));
        assert_eq!(decoded.seq, 2);
        assert_eq!(
            decoded.payload,
            Payload::TagClaim(TagClaimMsg { target: "B".into() })
        );
    }

    #[test]
    fn powerup_claim_field_is_camel_case() {
        let raw = br#"{"type":"powerupClaim","peerId":"X","seq":1,"payload":{"powerUpId":"p1"}}"#;
        let decoded = decode_message(raw, WireFormat::Json).unwrap().unwrap();
        assert_eq!(
            decoded.payload,
            Payload::PowerUpClaim(PowerUpClaimMsg {
                power_up_id: "p1".into()
            })
        );
    }

    #[test]
    fn unknown_type_is_ignored() {
        let raw = br#"{"type":"emote","peerId":"A","seq":3,"payload":{"kind":"wave"}}"#;
        assert!(decode_message(raw, WireFormat::Json).unwrap().is_none());
    }

    #[test]
    fn leave_without_payload_decodes() {
        let raw = br#"{"type":"leave","peerId":"A","seq":9}"#;
        let decoded = decode_message(raw, WireFormat::Json).unwrap().unwrap();
        assert_eq!(decoded.payload, Payload::Leave);
    }

    #[test]
    fn missing_payload_field_is_malformed() {
        let raw = br#"{"type":"position","peerId":"A","seq":1,"payload":{"x":1}}"#;
        let err = decode_message(raw, WireFormat::Json).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidPayload {
                message_type: MessageType::Position,
                ..
            }
        ));
    }

    #[test]
    fn missing_seq_is_malformed() {
        let raw = br#"{"type":"position","peerId":"A","payload":{"x":1,"y":2}}"#;
        assert!(matches!(
            decode_message(raw, WireFormat::Json),
            Err(ProtocolError::DeserializeError(_))
        ));
    }

    #[test]
    fn garbage_and_empty_frames_fail() {
        assert!(matches!(
            decode_message(&[], WireFormat::Json),
            Err(ProtocolError::EmptyMessage)
        ));
        assert!(decode_message(b"not json", WireFormat::Json).is_err());
        assert!(decode_message(&[0xc1], WireFormat::MessagePack).is_err());
    }

    #[test]
    fn oversized_frame_rejected_before_parsing() {
        let data = vec![b' '; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            decode_message(&data, WireFormat::Json),
            Err(ProtocolError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn snapshot_survives_both_formats() {
        let mut seqs = BTreeMap::new();
        seqs.insert(PeerId::from("b"), 12);
        let snapshot = RoomSnapshot {
            participants: vec![ParticipantSnapshot {
                peer_id: "b".into(),
                x: 1.5,
                y: 2.5,
                effect: Effect::Invisible,
                effect_remaining_ms: Some(1200),
                score: 3,
            }],
            tagger: Some("b".into()),
            host: Some("b".into()),
            round: 2,
            round_remaining_ms: 90_000,
            powerups: vec![PowerUpSnapshot {
                id: "p9".into(),
                kind: PowerUpKind::Teleport,
                x: 300.0,
                y: 200.0,
                ttl_ms: 4_000,
            }],
            seqs,
        };
        let original = msg(Payload::Snapshot(Box::new(snapshot)));
        for format in [WireFormat::Json, WireFormat::MessagePack] {
            let encoded = encode_message(&original, format).unwrap();
            let decoded = decode_message(&encoded, format).unwrap().unwrap();
            assert_eq!(decoded, original, "{format:?}");
        }
    }

    #[test]
    fn messagepack_carries_every_payload_kind() {
        let payloads = vec![
            Payload::Position(PositionMsg { x: 1.0, y: 2.0 }),
            Payload::TagClaim(TagClaimMsg { target: "t".into() }),
            Payload::PowerUpClaim(PowerUpClaimMsg {
                power_up_id: "p".into(),
            }),
            Payload::Join(JoinMsg { x: 3.0, y: 4.0 }),
            Payload::Leave,
            Payload::PowerUpSpawn(PowerUpSpawnMsg {
                id: "p".into(),
                kind: PowerUpKind::Freeze,
                x: 5.0,
                y: 6.0,
                ttl_ms: 15_000,
            }),
            Payload::RoundEnd(RoundEndMsg { round: 4 }),
        ];
        for payload in payloads {
            let original = msg(payload);
            let encoded = encode_message(&original, WireFormat::MessagePack).unwrap();
            let decoded = decode_message(&encoded, WireFormat::MessagePack)
                .unwrap()
                .unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn type_strings_are_stable() {
        for t in MessageType::ALL {
            assert_eq!(MessageType::parse(t.as_str()), Some(t));
        }
        assert_eq!(MessageType::PowerUpClaim.as_str(), "powerupClaim");
        assert_eq!(MessageType::parse("Position"), None);
    }

    #[test]
    fn protocol_error_display() {
        assert_eq!(format!("{}", ProtocolError::EmptyMessage), "empty message");
        assert!(format!("{}", ProtocolError::PayloadTooLarge(99999)).contains("99999"));
        let err = ProtocolError::InvalidPayload {
            message_type: MessageType::Join,
            reason: "missing field `x`".into(),
        };
        assert_eq!(format!("{err}"), "invalid join payload: missing field `x`");
    }
}
