//! Persistence gateway for room records, chat history, and recordings.
//!
//! The relay core only talks to the [`RoomStore`] trait; the SQLite
//! implementation below is the production backend. Handlers depend on the
//! trait so tests can substitute a mock.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::common::time::{millis_to_rfc3339, now_utc_millis};

use super::error::StoreError;

/// Durable room record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    /// Empty string means the room is open (no password required)
    pub password: String,
    /// Creation time, Unix epoch milliseconds (UTC)
    pub created_at_millis: i64,
}

/// One persisted chat message, as replayed to joining clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistoryEntry {
    pub username: String,
    pub text: String,
    pub timestamp: String,
}

/// Data access interface consumed by the relay core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Create the durable record for a new room.
    async fn create_room_record(&self, room_id: &str, password: &str) -> Result<(), StoreError>;

    /// Look up the durable record for a room, if it exists.
    async fn room_record(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError>;

    /// Append a chat message and return the timestamp it was recorded with.
    async fn insert_chat_message(
        &self,
        room_id: &str,
        client_id: &str,
        display_name: &str,
        text: &str,
    ) -> Result<String, StoreError>;

    /// Fetch up to `limit` chat messages for a room, oldest first.
    async fn recent_history(
        &self,
        room_id: &str,
        limit: u32,
    ) -> Result<Vec<ChatHistoryEntry>, StoreError>;

    /// Append call recording metadata.
    async fn insert_recording(
        &self,
        room_id: &str,
        started_at: Option<String>,
        duration_seconds: Option<i64>,
        participants: Option<String>,
    ) -> Result<(), StoreError>;
}

/// SQLite-backed [`RoomStore`].
pub struct SqliteRoomStore {
    pool: SqlitePool,
}

impl SqliteRoomStore {
    /// Open (and create if missing) the database at `database_url` and run
    /// the schema setup.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open a private in-memory database. Used by tests and ad-hoc runs.
    pub async fn in_memory() -> Result<Self, StoreError> {
        // a single connection, otherwise every pool checkout would see its
        // own empty in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rooms (
                room_id TEXT PRIMARY KEY,
                password TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                username TEXT NOT NULL,
                message TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS recordings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id TEXT NOT NULL,
                started_at TEXT,
                ended_at TEXT NOT NULL,
                duration_seconds INTEGER,
                participants TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RoomStore for SqliteRoomStore {
    async fn create_room_record(&self, room_id: &str, password: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO rooms (room_id, password, created_at) VALUES (?, ?, ?)")
            .bind(room_id)
            .bind(password)
            .bind(now_utc_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn room_record(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError> {
        let row = sqlx::query("SELECT password, created_at FROM rooms WHERE room_id = ?")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(RoomRecord {
                password: row.try_get("password")?,
                created_at_millis: row.try_get("created_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_chat_message(
        &self,
        room_id: &str,
        client_id: &str,
        display_name: &str,
        text: &str,
    ) -> Result<String, StoreError> {
        let timestamp = millis_to_rfc3339(now_utc_millis());
        sqlx::query(
            "INSERT INTO messages (room_id, client_id, username, message, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(room_id)
        .bind(client_id)
        .bind(display_name)
        .bind(text)
        .bind(&timestamp)
        .execute(&self.pool)
        .await?;
        Ok(timestamp)
    }

    async fn recent_history(
        &self,
        room_id: &str,
        limit: u32,
    ) -> Result<Vec<ChatHistoryEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT username, message, timestamp FROM messages
             WHERE room_id = ? ORDER BY id ASC LIMIT ?",
        )
        .bind(room_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut history = Vec::with_capacity(rows.len());
        for row in rows {
            history.push(ChatHistoryEntry {
                username: row.try_get("username")?,
                text: row.try_get("message")?,
                timestamp: row.try_get("timestamp")?,
            });
        }
        Ok(history)
    }

    async fn insert_recording(
        &self,
        room_id: &str,
        started_at: Option<String>,
        duration_seconds: Option<i64>,
        participants: Option<String>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO recordings (room_id, started_at, ended_at, duration_seconds, participants)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(room_id)
        .bind(started_at)
        .bind(millis_to_rfc3339(now_utc_millis()))
        .bind(duration_seconds)
        .bind(participants)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
