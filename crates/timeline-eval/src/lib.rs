//! `ss-timeline-eval` — Timeline evaluation for SurfaceSync clips.
//!
//! A clip's timeline is an ordered list of keyframes, each of which either
//! `set`s properties, `lerp`s them from the previous assignment, or marks the
//! clip inactive (`null`). This crate answers "what should this clip look and
//! sound like at time T":
//!
//! - **Property evaluation**: constant holds and linear interpolation
//!   ([`evaluate_properties`])
//! - **Temporal evaluation**: the integrated media position and rate of an
//!   audio/video clip ([`evaluate_temporal`])
//! - **Clip evaluation**: per-kind property sets with defaults applied
//!   ([`evaluate_clip`]), plus activity and loop-point queries
//!
//! Everything here is a pure function of the keyframes and the query time.
//!
//! # Usage
//!
//! ```rust
//! use ss_timeline_eval::{evaluate_temporal, Keyframe, KeyframeEffect};
//!
//! let keyframes = vec![
//!     Keyframe::new(0, KeyframeEffect::new().set("t", 0.0).set("rate", 1.0)),
//!     Keyframe::new(100, KeyframeEffect::new().set("rate", 0.0)),
//! ];
//! let position = evaluate_temporal(&keyframes, 150.0).unwrap();
//! assert_eq!(position.t, 100.0);
//! ```

pub mod clip;
pub mod error;
pub mod keyframe;
pub mod types;

pub use clip::{
    evaluate_audio, evaluate_clip, evaluate_image, evaluate_video, first_timestamp, is_active,
    next_keyframe_after, next_reset, AudioProperties, EvaluatedProperties, ImageProperties,
    TemporalReset, VideoProperties,
};
pub use error::StateError;
pub use keyframe::{evaluate_properties, evaluate_temporal, evaluate_temporal_before, TemporalPosition};
pub use types::{
    AudioClip, ClipKind, ClipState, Fit, ImageClip, Keyframe, KeyframeEffect, PropertyMap,
    PropertyValue, SurfaceState, VideoClip,
};
