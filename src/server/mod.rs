//! WebRTC signaling relay server implementation.

mod config;
mod error;
mod handler;
mod protocol;
mod registry;
mod room;
mod runner;
mod signal;
mod state;
mod store;

pub use config::ServerConfig;
pub use runner::{build_router, run_server};
pub use state::AppState;
pub use store::{ChatHistoryEntry, RoomStore, SqliteRoomStore};
