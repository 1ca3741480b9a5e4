//! Error types for clock synchronization.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimeSyncError {
    /// The outbound probe channel has no receiver any more.
    #[error("Time sync transport closed")]
    TransportClosed,

    #[error("Invalid time sync message: {0}")]
    Json(#[from] serde_json::Error),
}
