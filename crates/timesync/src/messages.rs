//! Wire messages of the probe exchange.
//!
//! ```json
//! { "timesync": { "id": 7 } }
//! { "timesync": { "id": 7, "now": 1718000000000 } }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::TimeSyncError;

/// Body of a probe request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub id: u64,
}

/// Body of a probe response: the request id and the responder's wall clock
/// in whole milliseconds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub id: u64,
    pub now: i64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSyncRequest {
    pub timesync: ProbeRequest,
}

impl TimeSyncRequest {
    pub fn new(id: u64) -> Self {
        Self {
            timesync: ProbeRequest { id },
        }
    }

    pub fn id(&self) -> u64 {
        self.timesync.id
    }

    pub fn from_json(json: &str) -> Result<Self, TimeSyncError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSyncResponse {
    pub timesync: ProbeResponse,
}

impl TimeSyncResponse {
    pub fn new(id: u64, now: i64) -> Self {
        Self {
            timesync: ProbeResponse { id, now },
        }
    }

    pub fn id(&self) -> u64 {
        self.timesync.id
    }

    pub fn now(&self) -> i64 {
        self.timesync.now
    }

    pub fn from_json(json: &str) -> Result<Self, TimeSyncError> {
        Ok(serde_json::from_str(json)?)
    }
}
