//! HTTP admission endpoints and the WebSocket relay handler.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::common::time::{millis_to_rfc3339, now_utc_millis};

use super::{
    error::{AdmissionError, CreationError, JoinError, StoreError},
    protocol::{ClientMessage, ServerMessage, SignalKind},
    room::{Admitted, Room},
    state::{AppState, ConnectQuery},
    store::RoomStore,
};

/// Request body for `POST /create_room`
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    /// Omitted or empty means the server generates an id
    pub room_id: Option<String>,
    #[serde(default)]
    pub password: String,
}

/// Request body for `POST /join_room`
#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub username: String,
}

/// Request body for `POST /save_recording`
#[derive(Debug, Deserialize)]
pub struct SaveRecordingRequest {
    #[serde(default)]
    pub room_id: String,
    pub started_at: Option<String>,
    pub duration_seconds: Option<i64>,
    pub participants: Option<String>,
}

fn failure(error: impl std::fmt::Display) -> Json<Value> {
    Json(json!({"success": false, "error": error.to_string()}))
}

fn internal_error(e: StoreError) -> StatusCode {
    tracing::error!("Persistence gateway error: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

fn generate_room_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("room-{}", &id[..8])
}

/// Create the durable record for a new room.
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<Json<Value>, StatusCode> {
    let room_id = match req.room_id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => generate_room_id(),
    };

    if req.password.len() > state.config.max_password_len {
        return Ok(failure(CreationError::PasswordTooLong));
    }

    if state
        .store
        .room_record(&room_id)
        .await
        .map_err(internal_error)?
        .is_some()
    {
        return Ok(failure(CreationError::RoomAlreadyExists));
    }

    state
        .store
        .create_room_record(&room_id, &req.password)
        .await
        .map_err(internal_error)?;
    tracing::info!("Room '{}' record created", room_id);

    Ok(Json(json!({"success": true, "room_id": room_id})))
}

/// Check the room password and reserve an admission slot.
///
/// On success the response carries the one-time token for the WebSocket
/// upgrade plus the room's recent chat history, oldest first.
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JoinRoomRequest>,
) -> Result<Json<Value>, StatusCode> {
    let username = req.username.trim();
    if req.room_id.is_empty()
        || username.is_empty()
        || username.chars().count() > state.config.max_username_len
    {
        return Ok(failure(JoinError::InvalidInput));
    }

    let record = match state
        .store
        .room_record(&req.room_id)
        .await
        .map_err(internal_error)?
    {
        Some(record) => record,
        None => return Ok(failure(JoinError::RoomNotFound)),
    };

    // room age is checked at join time; there is no background sweep
    let age_millis = now_utc_millis() - record.created_at_millis;
    if age_millis > state.config.max_room_age.num_milliseconds() {
        return Ok(failure(JoinError::RoomExpired));
    }

    if !record.password.is_empty() && record.password != req.password {
        return Ok(failure(JoinError::IncorrectPassword));
    }

    let room = state.registry.get_or_create(&req.room_id).await;
    let token = room.reserve(username).await;

    let history = state
        .store
        .recent_history(&req.room_id, state.config.history_limit)
        .await
        .map_err(internal_error)?;

    Ok(Json(json!({
        "success": true,
        "room_id": req.room_id,
        "token": token,
        "history": history,
    })))
}

/// Persist call recording metadata.
pub async fn save_recording(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveRecordingRequest>,
) -> Result<Json<Value>, StatusCode> {
    state
        .store
        .insert_recording(
            &req.room_id,
            req.started_at,
            req.duration_seconds,
            req.participants,
        )
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({"success": true})))
}

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Upgrade handler for `GET /ws/{room_id}?token=...`.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, query.token))
}

/// Own one upgraded connection: admission, relay loop, guaranteed departure.
pub async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    room_id: String,
    token: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();

    let room = state.registry.get_or_create(&room_id).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let admission = match token.as_deref() {
        Some(token) => room.admit(token, tx).await,
        None => Err(AdmissionError::InvalidToken),
    };

    let admitted = match admission {
        Ok(admitted) => admitted,
        Err(reason) => {
            tracing::warn!("Rejecting connection to room '{}': {}", room_id, reason);
            let rejection = match reason {
                AdmissionError::RoomFull => ServerMessage::RoomFull,
                AdmissionError::InvalidToken => ServerMessage::Error {
                    message: reason.to_string(),
                },
            };
            if let Err(e) = sender.send(Message::Text(rejection.to_frame().into())).await {
                tracing::debug!("Failed to deliver rejection: {}", e);
            }
            // a room lazily created by this failed attempt must not linger
            state.registry.remove_if_idle(&room_id).await;
            return;
        }
    };

    let Admitted {
        client_id,
        display_name,
        participant_count,
    } = admitted;
    tracing::info!(
        "'{}' ({}) joined room '{}'. Total: {}",
        display_name,
        client_id,
        room_id,
        participant_count
    );

    // the ready frame goes out before the writer task starts draining the
    // queue, so it is always the first frame this client sees
    let ready = ServerMessage::Ready {
        client_id: client_id.clone(),
        participant_count,
    };
    if let Err(e) = sender.send(Message::Text(ready.to_frame().into())).await {
        tracing::warn!("Failed to send ready to '{}': {}", client_id, e);
    }

    let room_recv = room.clone();
    let state_recv = state.clone();
    let client_id_recv = client_id.clone();
    let display_name_recv = display_name.clone();
    let room_id_recv = room_id.clone();

    // Spawn a task to receive messages from this client
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("WebSocket error: {}", e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    let parsed = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            tracing::debug!(
                                "Ignoring malformed frame from '{}': {}",
                                client_id_recv,
                                e
                            );
                            continue;
                        }
                    };

                    match parsed {
                        ClientMessage::Join { username } => {
                            // the token already told us who this is
                            tracing::debug!(
                                "Ignoring join announcement from '{}' ('{}')",
                                client_id_recv,
                                username
                            );
                        }
                        ClientMessage::Chat { text } => {
                            handle_chat(
                                &state_recv,
                                &room_recv,
                                &room_id_recv,
                                &client_id_recv,
                                &display_name_recv,
                                &text,
                            )
                            .await;
                        }
                        ClientMessage::Offer { target_id, payload } => {
                            relay_signal(
                                &room_recv,
                                SignalKind::Offer,
                                &client_id_recv,
                                &target_id,
                                payload,
                            )
                            .await;
                        }
                        ClientMessage::Answer { target_id, payload } => {
                            relay_signal(
                                &room_recv,
                                SignalKind::Answer,
                                &client_id_recv,
                                &target_id,
                                payload,
                            )
                            .await;
                        }
                        ClientMessage::IceCandidate { target_id, payload } => {
                            relay_signal(
                                &room_recv,
                                SignalKind::IceCandidate,
                                &client_id_recv,
                                &target_id,
                                payload,
                            )
                            .await;
                        }
                    }
                }
                Message::Close(_) => {
                    tracing::info!("Client '{}' requested close", client_id_recv);
                    break;
                }
                Message::Ping(_) => {
                    tracing::debug!("Received ping");
                    // Ping/pong is handled automatically by the WebSocket protocol
                }
                _ => {}
            }
        }
    });

    // Spawn a task to drain this participant's outbound queue onto the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    // guaranteed cleanup: exactly one depart per admitted connection,
    // whatever ended the loop
    let departure = room.depart(&client_id).await;
    tracing::info!(
        "'{}' left room '{}'. Remaining: {}",
        display_name,
        room_id,
        departure.remaining
    );
    if departure.now_empty {
        state.registry.remove_if_empty(&room_id).await;
    }
}

async fn handle_chat(
    state: &AppState,
    room: &Room,
    room_id: &str,
    client_id: &str,
    display_name: &str,
    raw: &str,
) {
    // chat payloads are trimmed and capped before persistence and relay
    let text: String = raw.trim().chars().take(state.config.max_chat_len).collect();
    if text.is_empty() {
        return;
    }

    let timestamp = match state
        .store
        .insert_chat_message(room_id, client_id, display_name, &text)
        .await
    {
        Ok(timestamp) => timestamp,
        Err(e) => {
            // persistence failure must not stop the relay
            tracing::warn!("Failed to persist chat message in room '{}': {}", room_id, e);
            millis_to_rfc3339(now_utc_millis())
        }
    };

    room.broadcast(&ServerMessage::Chat {
        sender_display_name: display_name.to_string(),
        text,
        timestamp,
    })
    .await;
}

async fn relay_signal(
    room: &Room,
    kind: SignalKind,
    sender_id: &str,
    target_id: &str,
    mut payload: Map<String, Value>,
) {
    // the client may have written its own sender_id; the admitted id wins
    payload.remove("sender_id");
    let frame = ServerMessage::signal(kind, sender_id, target_id, payload);
    room.relay_to(target_id, &frame).await;
}
