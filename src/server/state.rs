//! Server state and connection management.

use std::sync::Arc;

use serde::Deserialize;

use super::{config::ServerConfig, registry::RoomRegistry, store::RoomStore};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    /// One-time admission token issued by the join endpoint
    pub token: Option<String>,
}

/// Shared application state
pub struct AppState {
    /// Runtime configuration
    pub config: ServerConfig,
    /// In-memory registry of active rooms
    pub registry: RoomRegistry,
    /// Persistence gateway
    pub store: Arc<dyn RoomStore>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn RoomStore>) -> Self {
        Self {
            registry: RoomRegistry::new(config.max_participants),
            config,
            store,
        }
    }
}
