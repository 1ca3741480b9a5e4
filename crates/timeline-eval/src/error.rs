//! Error types for decoding declarative surface state.

use thiserror::Error;

/// Errors that can occur while decoding a surface state.
///
/// Evaluation itself never fails; only structurally unusable input is
/// rejected at the decoding boundary.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Invalid surface state JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Clip {clip_id} has no keyframes")]
    NoKeyframes { clip_id: String },
}
