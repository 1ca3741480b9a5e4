//! Clock sync client.
//!
//! A round sends `sample_size` probes one after another. Each probe records
//! the local wall clock and a monotonic instant when it is sent, and the
//! monotonic instant when its response arrives. Assuming a symmetric path,
//! the responder's clock read happened half a round trip after sending, so
//!
//! ```text
//! offset = server_now - client_now - rtt / 2
//! ```
//!
//! Probes that time out are left out of the average. A round with no
//! answers leaves the shared [`ClockOffset`] as it was.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use ss_common::{ClockOffset, TimeSyncConfig, WallClock};
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::TimeSyncError;
use crate::messages::{TimeSyncRequest, TimeSyncResponse};

/// Timings of one answered probe, in milliseconds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProbeSample {
    /// Monotonic send time.
    pub sent_at_ms: f64,
    /// Monotonic receive time, on the same base as `sent_at_ms`.
    pub received_at_ms: f64,
    /// Local wall clock at send.
    pub client_now_ms: f64,
    /// Responder's wall clock.
    pub server_now_ms: f64,
}

impl ProbeSample {
    pub fn round_trip_ms(&self) -> f64 {
        self.received_at_ms - self.sent_at_ms
    }

    /// Offset estimate from this probe alone.
    pub fn offset_ms(&self) -> f64 {
        self.server_now_ms - self.client_now_ms - self.round_trip_ms() / 2.0
    }
}

/// Mean offset of `samples`, or `None` if there are none.
pub fn average_offset(samples: &[ProbeSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().map(ProbeSample::offset_ms).sum();
    Some(sum / samples.len() as f64)
}

type Reply = (Instant, f64);

struct Inner {
    config: TimeSyncConfig,
    clock: Arc<dyn WallClock>,
    offset: ClockOffset,
    outbound: mpsc::UnboundedSender<TimeSyncRequest>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    updates: watch::Sender<Option<f64>>,
    stopped: AtomicBool,
    stop: Notify,
}

/// Estimates the offset to a remote clock and publishes it to a shared
/// [`ClockOffset`].
///
/// Requests go out through `outbound`; whoever owns the transport passes
/// responses back in through [`receive`](Self::receive). Clones share the
/// same client.
#[derive(Clone)]
pub struct TimeSyncClient {
    inner: Arc<Inner>,
}

impl TimeSyncClient {
    pub fn new(
        config: TimeSyncConfig,
        clock: Arc<dyn WallClock>,
        offset: ClockOffset,
        outbound: mpsc::UnboundedSender<TimeSyncRequest>,
    ) -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                offset,
                outbound,
                next_id: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
                updates,
                stopped: AtomicBool::new(false),
                stop: Notify::new(),
            }),
        }
    }

    /// Create a client and start its repeating rounds.
    pub fn spawn(
        config: TimeSyncConfig,
        clock: Arc<dyn WallClock>,
        offset: ClockOffset,
        outbound: mpsc::UnboundedSender<TimeSyncRequest>,
    ) -> (Self, JoinHandle<()>) {
        let client = Self::new(config, clock, offset, outbound);
        let task = client.start();
        (client, task)
    }

    /// Run a round now, then one every `interval` until [`destroy`](Self::destroy).
    pub fn start(&self) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move { client.run().await })
    }

    async fn run(self) {
        let interval = self.inner.config.interval();
        loop {
            if self.is_destroyed() {
                break;
            }
            if let Err(e) = self.synchronize_once().await {
                warn!("Time sync stopped: {}", e);
                break;
            }
            if self.is_destroyed() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.inner.stop.notified() => break,
            }
        }
        debug!("Time sync loop finished");
    }

    /// Stop scheduling rounds. A round already in progress runs to the end.
    pub fn destroy(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.stop.notify_one();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// The shared estimate this client writes.
    pub fn offset(&self) -> &ClockOffset {
        &self.inner.offset
    }

    /// Completed-round estimates. Starts at `None` until a round succeeds.
    pub fn subscribe(&self) -> watch::Receiver<Option<f64>> {
        self.inner.updates.subscribe()
    }

    /// Hand a probe response to the client. Unknown or late ids are ignored.
    pub fn receive(&self, response: &TimeSyncResponse) {
        let received_at = Instant::now();
        let Some(reply) = self.inner.pending.lock().remove(&response.id()) else {
            trace!(id = response.id(), "Ignoring response to unknown probe");
            return;
        };
        let _ = reply.send((received_at, response.now() as f64));
    }

    /// Run one round and return the new estimate, if any probe was answered.
    pub async fn synchronize_once(&self) -> Result<Option<f64>, TimeSyncError> {
        let sample_size = self.inner.config.sample_size;
        let mut samples = Vec::with_capacity(sample_size);
        for _ in 0..sample_size {
            if let Some(sample) = self.probe().await? {
                samples.push(sample);
            }
        }

        match average_offset(&samples) {
            Some(offset_ms) => {
                self.inner.offset.set(offset_ms);
                self.inner.updates.send_replace(Some(offset_ms));
                info!(
                    offset_ms,
                    answered = samples.len(),
                    sent = sample_size,
                    "Clock offset updated"
                );
                Ok(Some(offset_ms))
            }
            None => {
                debug!(sent = sample_size, "No probes answered, keeping clock offset");
                Ok(None)
            }
        }
    }

    async fn probe(&self) -> Result<Option<ProbeSample>, TimeSyncError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, tx);

        let client_now_ms = self.inner.clock.now_ms();
        let sent_at = Instant::now();
        if self.inner.outbound.send(TimeSyncRequest::new(id)).is_err() {
            self.inner.pending.lock().remove(&id);
            return Err(TimeSyncError::TransportClosed);
        }

        let reply = tokio::time::timeout(self.inner.config.probe_timeout(), rx).await;
        self.inner.pending.lock().remove(&id);

        match reply {
            Ok(Ok((received_at, server_now_ms))) => Ok(Some(ProbeSample {
                sent_at_ms: 0.0,
                received_at_ms: received_at.duration_since(sent_at).as_secs_f64() * 1000.0,
                client_now_ms,
                server_now_ms,
            })),
            Ok(Err(_)) => Ok(None),
            Err(_) => {
                debug!(id, "Time sync probe timed out");
                Ok(None)
            }
        }
    }
}
