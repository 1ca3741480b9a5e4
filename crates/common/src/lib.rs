//! `ss-common` — Shared types for the SurfaceSync engine.
//!
//! Every other crate in the workspace depends on this one. It defines:
//!
//! - **Clocks**: `WallClock`, `SystemClock`, `InstantClock`, and the
//!   offset-corrected `SyncedClock`
//! - **Clock offset**: `ClockOffset`, the single shared estimate written by
//!   the clock sync client and read by every clip controller
//! - **Config**: `EngineConfig`, `DriftConfig`, `TimeSyncConfig`
//! - **Errors**: `SurfaceError`, the failure type of every surface command

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{ClockOffset, InstantClock, SyncedClock, SystemClock, WallClock};
pub use config::{DriftConfig, EngineConfig, TimeSyncConfig};
pub use error::{SurfaceError, SurfaceResult};
