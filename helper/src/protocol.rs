//! Message types for the WebSocket protocol
//!
//! Every message is a JSON object with a single key naming its type:
//!
//! ```json
//! { "timesync": { "id": 3 } }
//! { "surfaceState": { "intro": { "type": "video", ... } } }
//! { "ping": { "id": 1 } }
//! ```

use serde::{Deserialize, Serialize};
use ss_timeline_eval::SurfaceState;
use ss_timesync::{ProbeRequest, ProbeResponse, TimeSyncRequest, TimeSyncResponse};

/// Messages sent by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Clock sync probe
    Timesync(ProbeRequest),

    /// Publish a new surface state
    SurfaceState(SurfaceState),

    /// Keepalive
    Ping { id: u64 },
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerMessage {
    /// Answer to a clock sync probe
    Timesync(ProbeResponse),

    /// Current surface state, sent on connect and after every publish
    SurfaceState(SurfaceState),

    /// Keepalive answer
    Pong { id: u64 },

    /// Request could not be handled
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<TimeSyncRequest> for ClientMessage {
    fn from(request: TimeSyncRequest) -> Self {
        ClientMessage::Timesync(request.timesync)
    }
}

impl From<TimeSyncResponse> for ServerMessage {
    fn from(response: TimeSyncResponse) -> Self {
        ServerMessage::Timesync(response.timesync)
    }
}

/// Error codes
pub mod error_codes {
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
    pub const INVALID_STATE: &str = "INVALID_STATE";
    pub const UNEXPECTED_BINARY: &str = "UNEXPECTED_BINARY";
}
