//! Probe responder.

use std::sync::Arc;

use ss_common::{SystemClock, WallClock};

use crate::messages::{TimeSyncRequest, TimeSyncResponse};

/// Answers probes with its own wall clock. Holds no per-client state.
#[derive(Clone, Debug)]
pub struct TimeSyncServer {
    clock: Arc<dyn WallClock>,
}

impl TimeSyncServer {
    pub fn new(clock: Arc<dyn WallClock>) -> Self {
        Self { clock }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    pub fn respond(&self, request: &TimeSyncRequest) -> TimeSyncResponse {
        let now = self.clock.now_ms().round() as i64;
        tracing::trace!(id = request.id(), now, "Answering time sync probe");
        TimeSyncResponse::new(request.id(), now)
    }
}
