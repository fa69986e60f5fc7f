//! Wire protocol for the relay connection.
//!
//! Every frame is a JSON object tagged by a `type` field. Inbound frames are
//! parsed into [`ClientMessage`]; frames that fail to parse (unknown kind,
//! missing fields, invalid JSON) are ignored by the relay loop. Signaling
//! payloads (SDP offers/answers, ICE candidates) are opaque to the server and
//! carried as raw JSON maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The three signaling kinds relayed point-to-point between participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// Messages received from a connected client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Client-side join announcement. The server already knows the
    /// participant from its admission token, so this carries no effect.
    Join {
        #[serde(default)]
        username: String,
    },
    /// Chat text to broadcast to the whole room.
    Chat { text: String },
    /// SDP offer addressed to one participant.
    Offer {
        target_id: String,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    /// SDP answer addressed to one participant.
    Answer {
        target_id: String,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    /// ICE candidate addressed to one participant.
    IceCandidate {
        target_id: String,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
}

/// Messages pushed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent to a participant right after admission.
    Ready {
        client_id: String,
        participant_count: usize,
    },
    /// Sent to existing participants when a new one is admitted.
    ParticipantJoined {
        new_id: String,
        new_display_name: String,
        participant_count: usize,
    },
    /// Sent to remaining participants when one leaves.
    ParticipantLeft {
        left_id: String,
        participant_count: usize,
    },
    /// Terminal rejection: the room is at capacity.
    RoomFull,
    /// Terminal rejection with a human-readable reason.
    Error { message: String },
    /// A relayed chat message, echoed to the sender as well.
    Chat {
        sender_display_name: String,
        text: String,
        timestamp: String,
    },
    /// Relayed SDP offer.
    Offer {
        sender_id: String,
        target_id: String,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    /// Relayed SDP answer.
    Answer {
        sender_id: String,
        target_id: String,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    /// Relayed ICE candidate.
    IceCandidate {
        sender_id: String,
        target_id: String,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
}

impl ServerMessage {
    /// Build the outbound frame for a directed signaling message.
    ///
    /// The payload is forwarded untouched; `sender_id` is the admitted id of
    /// the sending connection, not whatever the client claimed.
    pub fn signal(
        kind: SignalKind,
        sender_id: &str,
        target_id: &str,
        payload: Map<String, Value>,
    ) -> Self {
        let sender_id = sender_id.to_string();
        let target_id = target_id.to_string();
        match kind {
            SignalKind::Offer => Self::Offer {
                sender_id,
                target_id,
                payload,
            },
            SignalKind::Answer => Self::Answer {
                sender_id,
                target_id,
                payload,
            },
            SignalKind::IceCandidate => Self::IceCandidate {
                sender_id,
                target_id,
                payload,
            },
        }
    }

    /// Serialize to the wire format.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).expect("ServerMessage serializes to JSON")
    }
}
