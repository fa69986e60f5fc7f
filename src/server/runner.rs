//! Server execution logic.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::{
    handler::{create_room, health_check, join_room, save_recording, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Assemble the application router around the shared state.
///
/// Split out of [`run_server`] so tests can serve the router on an ephemeral
/// port.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/create_room", post(create_room))
        .route("/join_room", post(join_room))
        .route("/save_recording", post(save_recording))
        .route("/api/health", get(health_check))
        .route("/ws/{room_id}", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the signaling relay server
///
/// # Arguments
///
/// * `host` - The host address to bind to (e.g., "127.0.0.1")
/// * `port` - The port number to bind to (e.g., 9080)
/// * `state` - Shared application state built by the caller
pub async fn run_server(
    host: String,
    port: u16,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(state);

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!(
        "Signaling relay server listening on {}",
        listener.local_addr()?
    );
    tracing::info!("Connect to: ws://{}/ws/{{room_id}}?token=...", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown gracefully");

    // Set up graceful shutdown signal handler
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
