//! Wire protocol between watch-party clients and the relay.
//!
//! Every frame is a JSON text message tagged by `type`, with camelCase
//! fields so browser clients can consume it unchanged. Signal payloads are
//! parsed into [`SignalPayload`] at the boundary, but the relay forwards them
//! without looking inside.

use serde::{Deserialize, Serialize};

use crate::id::ConnectionId;

// ---------------------------------------------------------------------------
// Shared payloads
// ---------------------------------------------------------------------------

/// What a participant tells the room about themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub nickname: String,
    #[serde(default)]
    pub avatar: String,
}

impl UserProfile {
    pub fn new(nickname: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            avatar: avatar.into(),
        }
    }
}

/// A participant as announced to other room members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub connection_id: ConnectionId,
    pub user: UserProfile,
}

/// A chat message as stored in room history and broadcast to members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender_connection_id: ConnectionId,
    pub user: UserProfile,
    pub text: String,
    /// Unix milliseconds.
    pub timestamp: i64,
}

/// An ICE candidate as produced by the local ICE agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
}

/// Peer-connection negotiation payload carried by `signal` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalPayload {
    /// SDP offer to establish or renegotiate a peer connection.
    Offer { sdp: String },
    /// SDP answer in response to an offer.
    Answer { sdp: String },
    /// Trickled ICE candidate.
    Candidate(IceCandidate),
}

impl SignalPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalPayload::Offer { .. } => "offer",
            SignalPayload::Answer { .. } => "answer",
            SignalPayload::Candidate(_) => "candidate",
        }
    }
}

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    JoinRoom {
        room_id: String,
        user: UserProfile,
    },
    LeaveRoom,
    Signal {
        target: ConnectionId,
        signal: SignalPayload,
    },
    ChatMessage {
        room_id: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<UserProfile>,
    },
    Reaction {
        room_id: String,
        emoji: String,
    },
    Buzz {
        room_id: String,
    },
    HandToggle {
        room_id: String,
        is_raised: bool,
    },
    Health,
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// First frame on every connection: the id the relay assigned to it.
    Welcome {
        connection_id: ConnectionId,
    },
    RoomUsers {
        users: Vec<PeerInfo>,
    },
    ChatHistory {
        messages: Vec<ChatMessage>,
    },
    UserJoined {
        connection_id: ConnectionId,
        user: UserProfile,
    },
    UserLeft {
        connection_id: ConnectionId,
    },
    Signal {
        sender: ConnectionId,
        signal: SignalPayload,
    },
    ChatMessage {
        message: ChatMessage,
    },
    Reaction {
        sender_connection_id: ConnectionId,
        emoji: String,
        timestamp: i64,
    },
    Buzz {
        sender_connection_id: ConnectionId,
        timestamp: i64,
    },
    HandUpdate {
        connection_id: ConnectionId,
        is_raised: bool,
    },
    Health {
        status: String,
        connections: usize,
        rooms: usize,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_room_wire_shape() {
        let raw = json!({
            "type": "join-room",
            "roomId": "R1",
            "user": { "nickname": "Al", "avatar": "🐶" }
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinRoom {
                room_id: "R1".into(),
                user: UserProfile::new("Al", "🐶"),
            }
        );
    }

    #[test]
    fn avatar_is_optional() {
        let raw = json!({ "type": "join-room", "roomId": "R1", "user": { "nickname": "" } });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert!(matches!(event, ClientEvent::JoinRoom { user, .. } if user.avatar.is_empty()));
    }

    #[test]
    fn unit_variants_carry_only_the_tag() {
        let json = serde_json::to_value(ClientEvent::LeaveRoom).unwrap();
        assert_eq!(json, json!({ "type": "leave-room" }));
        let health: ClientEvent = serde_json::from_value(json!({ "type": "health" })).unwrap();
        assert_eq!(health, ClientEvent::Health);
    }

    #[test]
    fn hand_toggle_uses_camel_case() {
        let raw = json!({ "type": "hand-toggle", "roomId": "R1", "isRaised": true });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::HandToggle {
                room_id: "R1".into(),
                is_raised: true
            }
        );
    }

    #[test]
    fn candidate_signal_is_flat() {
        let signal = SignalPayload::Candidate(IceCandidate {
            candidate: "candidate:1 1 udp 1 10.0.0.1 5000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        });
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["kind"], "candidate");
        assert_eq!(json["sdpMid"], "0");
        assert_eq!(json["sdpMLineIndex"], 0);
        assert_eq!(signal.kind(), "candidate");
    }

    #[test]
    fn relayed_signal_names_the_sender() {
        let event = ServerEvent::Signal {
            sender: ConnectionId::from("a"),
            signal: SignalPayload::Offer { sdp: "v=0".into() },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            json!({ "type": "signal", "sender": "a", "signal": { "kind": "offer", "sdp": "v=0" } })
        );
    }

    #[test]
    fn chat_message_broadcast_shape() {
        let event = ServerEvent::ChatMessage {
            message: ChatMessage {
                id: "m1".into(),
                sender_connection_id: ConnectionId::from("a"),
                user: UserProfile::new("Al", ""),
                text: "hi".into(),
                timestamp: 42,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chat-message");
        assert_eq!(json["message"]["senderConnectionId"], "a");
        assert_eq!(json["message"]["text"], "hi");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let raw = json!({ "type": "teleport" });
        assert!(serde_json::from_value::<ClientEvent>(raw).is_err());
    }
}
