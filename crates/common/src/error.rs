//! Error types shared across crates (thiserror-based).

use thiserror::Error;

/// Errors reported by a rendering surface backend.
///
/// None of these are fatal to a clip controller: a failed command is logged
/// and the next reconciliation tick issues it again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("Unknown surface handle: {0}")]
    UnknownHandle(u64),

    #[error("Surface handle {0} is detached")]
    Detached(u64),

    #[error("Command rejected by surface: {0}")]
    Rejected(String),

    #[error("Surface backend unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for surface commands.
pub type SurfaceResult<T> = Result<T, SurfaceError>;
