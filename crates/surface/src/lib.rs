//! `ss-surface` — Keeps playback surfaces in step with their timelines.
//!
//! - [`Surface`]: the capability a rendering backend provides (create and
//!   destroy elements, set their properties, play, pause, seek, read back)
//! - [`ClipController`]: one tokio task per clip that reconciles an element
//!   towards the clip's evaluated state on every tick, correcting drift of
//!   audio/video by nudging the playback rate or seeking
//! - [`Orchestrator`]: diffs successive surface states and creates, updates,
//!   or tears down controllers
//! - [`SimulatedSurface`]: an in-memory backend for tests and headless
//!   followers
//!
//! All timing reads the offset-corrected [`ss_common::SyncedClock`].

pub mod controller;
pub mod drift;
mod image;
mod media;
pub mod orchestrator;
pub mod sim;
pub mod surface;

pub use controller::{Attachment, ClipController};
pub use drift::{classify, Correction};
pub use orchestrator::{Orchestrator, StateChanges};
pub use sim::SimulatedSurface;
pub use surface::{SeekCompletion, Surface, SurfaceHandle, SurfaceSnapshot};
