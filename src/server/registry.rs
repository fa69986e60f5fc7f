//! Process-wide registry of active rooms.
//!
//! Rooms are created lazily on first touch and removed as soon as their last
//! participant leaves. The map is guarded by its own mutex; lock order is
//! always registry first, then room, so removal can re-check emptiness
//! without racing a concurrent admission.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::room::Room;

pub struct RoomRegistry {
    max_participants: usize,
    rooms: Mutex<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new(max_participants: usize) -> Self {
        Self {
            max_participants,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Return the room named `room_id`, creating it if absent.
    ///
    /// Insert-if-absent runs under the registry lock, so two connections
    /// first-touching the same id always observe the same room.
    pub async fn get_or_create(&self, room_id: &str) -> Arc<Room> {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                tracing::info!("Room '{}' created", room_id);
                Arc::new(Room::new(room_id.to_string(), self.max_participants))
            })
            .clone()
    }

    /// Remove the room if it has no participants.
    ///
    /// Pending tokens die with the room: a later `get_or_create` for the same
    /// id yields a fresh room with no memory of prior reservations. If a
    /// concurrent admission repopulated the room first, removal is skipped.
    pub async fn remove_if_empty(&self, room_id: &str) {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get(room_id) {
            if room.participant_count().await == 0 {
                rooms.remove(room_id);
                tracing::info!("Room '{}' deleted", room_id);
            }
        }
    }

    /// Remove the room if it has neither participants nor pending tokens.
    ///
    /// Used after a failed admission so a room lazily created by a bogus
    /// connection attempt does not linger. A room holding an unredeemed
    /// reservation is kept alive for the client that reserved it.
    pub async fn remove_if_idle(&self, room_id: &str) {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get(room_id) {
            if room.is_idle().await {
                rooms.remove(room_id);
                tracing::debug!("Idle room '{}' deleted", room_id);
            }
        }
    }

    pub async fn contains(&self, room_id: &str) -> bool {
        self.rooms.lock().await.contains_key(room_id)
    }
}
