//! Room state: participants, pending admissions, and relay delivery.
//!
//! A [`Room`] owns its participant list and its pending-token map behind a
//! single async mutex, so admissions, departures, and fan-outs on the same
//! room are linearized: every notification observes a consistent participant
//! set and count. Delivery pushes serialized frames into each participant's
//! outbound queue; the queue is drained onto the socket by that connection's
//! writer task, so a stalled peer never blocks the room.

use std::collections::HashMap;

use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use super::error::AdmissionError;
use super::protocol::ServerMessage;

/// Channel feeding one participant's socket writer task.
pub type OutboundSender = mpsc::UnboundedSender<String>;

/// One connected participant.
struct Participant {
    id: String,
    display_name: String,
    sender: OutboundSender,
}

/// Result of a successful admission.
#[derive(Debug)]
pub struct Admitted {
    pub client_id: String,
    pub display_name: String,
    pub participant_count: usize,
}

/// Result of a departure.
#[derive(Debug)]
pub struct Departure {
    pub remaining: usize,
    pub now_empty: bool,
}

struct RoomInner {
    /// Connected participants in join order
    participants: Vec<Participant>,
    /// Reserved admission tokens, token -> display name
    pending: HashMap<String, String>,
}

/// A named session namespace bounding a fixed-capacity group of participants.
pub struct Room {
    id: String,
    max_participants: usize,
    inner: Mutex<RoomInner>,
}

impl Room {
    pub fn new(id: String, max_participants: usize) -> Self {
        Self {
            id,
            max_participants,
            inner: Mutex::new(RoomInner {
                participants: Vec::new(),
                pending: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reserve an admission slot: bind `display_name` to a fresh one-time
    /// token and return it.
    pub async fn reserve(&self, display_name: &str) -> String {
        let token = Uuid::new_v4().to_string();
        let mut inner = self.inner.lock().await;
        inner
            .pending
            .insert(token.clone(), display_name.to_string());
        tracing::debug!(
            "Reserved admission for '{}' in room '{}' ({} pending)",
            display_name,
            self.id,
            inner.pending.len()
        );
        token
    }

    /// Redeem `token` and admit the connection behind `sender`.
    ///
    /// The token is consumed even when the room turns out to be full; a
    /// rejected client must reserve again. On success every
    /// previously-connected participant is notified before this returns, so
    /// existing participants always learn of the new joiner before the joiner
    /// can relay anything.
    pub async fn admit(
        &self,
        token: &str,
        sender: OutboundSender,
    ) -> Result<Admitted, AdmissionError> {
        let mut inner = self.inner.lock().await;

        let display_name = inner
            .pending
            .remove(token)
            .ok_or(AdmissionError::InvalidToken)?;

        if inner.participants.len() >= self.max_participants {
            return Err(AdmissionError::RoomFull);
        }

        let client_id = Uuid::new_v4().to_string();
        inner.participants.push(Participant {
            id: client_id.clone(),
            display_name: display_name.clone(),
            sender,
        });
        let participant_count = inner.participants.len();

        let joined = ServerMessage::ParticipantJoined {
            new_id: client_id.clone(),
            new_display_name: display_name.clone(),
            participant_count,
        };
        let frame = joined.to_frame();
        for participant in &inner.participants {
            if participant.id != client_id && participant.sender.send(frame.clone()).is_err() {
                tracing::warn!(
                    "Failed to send participant_joined to client '{}'",
                    participant.id
                );
            }
        }

        Ok(Admitted {
            client_id,
            display_name,
            participant_count,
        })
    }

    /// Remove a participant and notify the remainder.
    ///
    /// Reports whether the room emptied so the caller can trigger registry
    /// removal. Must be invoked exactly once per admitted connection.
    pub async fn depart(&self, client_id: &str) -> Departure {
        let mut inner = self.inner.lock().await;

        let before = inner.participants.len();
        inner.participants.retain(|p| p.id != client_id);
        let remaining = inner.participants.len();

        if remaining < before && remaining > 0 {
            let left = ServerMessage::ParticipantLeft {
                left_id: client_id.to_string(),
                participant_count: remaining,
            };
            let frame = left.to_frame();
            for participant in &inner.participants {
                if participant.sender.send(frame.clone()).is_err() {
                    tracing::warn!(
                        "Failed to send participant_left to client '{}'",
                        participant.id
                    );
                }
            }
        }

        Departure {
            remaining,
            now_empty: remaining == 0,
        }
    }

    /// Deliver a frame to every current participant, the sender included.
    ///
    /// Per-recipient failures are logged and do not abort the fan-out.
    pub async fn broadcast(&self, msg: &ServerMessage) {
        let inner = self.inner.lock().await;
        let frame = msg.to_frame();
        for participant in &inner.participants {
            if participant.sender.send(frame.clone()).is_err() {
                tracing::warn!("Failed to send message to client '{}'", participant.id);
            }
        }
    }

    /// Deliver a frame to the single participant with `target_id`.
    ///
    /// A missing target is silently dropped; the sender is not told. This
    /// models a participant that already left by the time a stale signaling
    /// message arrives.
    pub async fn relay_to(&self, target_id: &str, msg: &ServerMessage) {
        let inner = self.inner.lock().await;
        match inner.participants.iter().find(|p| p.id == target_id) {
            Some(target) => {
                if target.sender.send(msg.to_frame()).is_err() {
                    tracing::warn!("Failed to relay message to client '{}'", target_id);
                }
            }
            None => {
                tracing::debug!(
                    "Dropping directed message for unknown client '{}' in room '{}'",
                    target_id,
                    self.id
                );
            }
        }
    }

    pub async fn participant_count(&self) -> usize {
        self.inner.lock().await.participants.len()
    }

    /// True when the room has neither participants nor pending admissions.
    pub async fn is_idle(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.participants.is_empty() && inner.pending.is_empty()
    }
}
