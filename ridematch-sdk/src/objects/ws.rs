//! WebSocket message types for the ride status stream.
//!
//! The `GET /rides/{ride_id}/ws` endpoint upgrades to a WebSocket
//! connection and pushes [`WsServerMessage`] JSON frames.
//!
//! # Protocol
//!
//! 1. The server sends a [`WsServerMessage::StatusUpdate`] with the
//!    current ride status immediately after the upgrade.
//! 2. Subsequent [`WsServerMessage::StatusUpdate`] frames are sent
//!    whenever the ride status changes.
//! 3. After a terminal status (`Assigned`, `Expired`, `Cancelled`) the
//!    server sends a normal close frame.

use serde::{Deserialize, Serialize};

use super::ride::RideResponse;

/// Server-to-client WebSocket message.
///
/// ```json
/// {"type":"status_update","ride":{ ... }}
/// {"type":"error","code":4004,"reason":"ride not found"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    StatusUpdate { ride: RideResponse },
    Error { code: u16, reason: String },
}

/// Close codes used by the ride status stream.
pub struct WsCloseCode;

impl WsCloseCode {
    pub const NORMAL: u16 = 1000;
    pub const INTERNAL_ERROR: u16 = 1011;
    pub const RIDE_NOT_FOUND: u16 = 4004;
}
