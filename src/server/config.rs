//! Server configuration.

use chrono::Duration;

/// Runtime configuration for the relay server.
///
/// Defaults match the original deployment: three participants per room,
/// 24 hour room lifetime, 100 messages of replayed chat history.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of participants admitted into one room
    pub max_participants: usize,
    /// Maximum number of chat messages replayed to a joining client
    pub history_limit: u32,
    /// Rooms older than this are refused at join time
    pub max_room_age: Duration,
    /// Chat messages are truncated to this many characters
    pub max_chat_len: usize,
    /// Display names longer than this are rejected
    pub max_username_len: usize,
    /// Room passwords longer than this are rejected
    pub max_password_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_participants: 3,
            history_limit: 100,
            max_room_age: Duration::hours(24),
            max_chat_len: 500,
            max_username_len: 50,
            max_password_len: 100,
        }
    }
}
