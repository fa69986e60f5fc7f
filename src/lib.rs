//! WebRTC signaling relay library.
//!
//! This library implements a room-based signaling relay for peer-to-peer
//! video calls: one-time admission tokens, join/leave notifications, chat
//! broadcast with persisted history, and verbatim point-to-point relay of
//! SDP offers/answers and ICE candidates.

pub mod common;
pub mod server;
