//! `ss-timesync` — Clock synchronization for SurfaceSync.
//!
//! Estimates the offset between the local wall clock and an authoritative
//! remote clock by exchanging timestamped probes over any duplex channel:
//!
//! - [`TimeSyncClient`] sends probes, collects answers, and writes the
//!   averaged offset into a shared [`ss_common::ClockOffset`]
//! - [`TimeSyncServer`] answers probes with its own wall clock
//!
//! The transport is the caller's: the client emits [`TimeSyncRequest`]s on
//! an mpsc channel and is fed [`TimeSyncResponse`]s through
//! [`TimeSyncClient::receive`].

pub mod client;
pub mod error;
pub mod messages;
pub mod server;

pub use client::{average_offset, ProbeSample, TimeSyncClient};
pub use error::TimeSyncError;
pub use messages::{ProbeRequest, ProbeResponse, TimeSyncRequest, TimeSyncResponse};
pub use server::TimeSyncServer;
