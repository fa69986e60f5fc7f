//! Error types for admission, room creation, joining, and persistence.

use thiserror::Error;

/// Errors raised when a connection presents its admission token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The token is unknown, already redeemed, or its room was destroyed.
    #[error("Invalid token")]
    InvalidToken,
    /// The room already holds the maximum number of participants.
    #[error("Room is full")]
    RoomFull,
}

/// Errors raised by the room creation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CreationError {
    #[error("Room ID already exists")]
    RoomAlreadyExists,
    #[error("Password too long")]
    PasswordTooLong,
}

/// Errors raised by the join endpoint before a token is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("Room not found. Create it first")]
    RoomNotFound,
    #[error("Incorrect password")]
    IncorrectPassword,
    #[error("This room is no longer supported (older than 24 hours)")]
    RoomExpired,
    #[error("Invalid room ID or username")]
    InvalidInput,
}

/// Errors surfaced by the persistence gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
