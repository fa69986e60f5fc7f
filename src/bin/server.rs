//! Signaling relay server for room-based WebRTC video calls.
//!
//! Brokers session establishment between participants and relays their
//! signaling and chat messages; media flows peer-to-peer.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin server
//! cargo run --bin server -- --host 0.0.0.0 --port 9080
//! ```

use std::sync::Arc;

use clap::Parser;
use video_call_rs::{
    common::logger::setup_logger,
    server::{AppState, ServerConfig, SqliteRoomStore, run_server},
};

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "WebRTC signaling relay server with room support", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "9080")]
    port: u16,

    /// SQLite database URL
    #[arg(long, default_value = "sqlite:video_calls.db")]
    database_url: String,

    /// Maximum number of participants per room
    #[arg(long, default_value_t = 3)]
    max_participants: usize,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    let store = match SqliteRoomStore::connect(&args.database_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to open database '{}': {}", args.database_url, e);
            std::process::exit(1);
        }
    };

    let config = ServerConfig {
        max_participants: args.max_participants,
        ..ServerConfig::default()
    };
    let state = Arc::new(AppState::new(config, store));

    if let Err(e) = run_server(args.host, args.port, state).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
