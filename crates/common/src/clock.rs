//! Wall clocks and the shared clock-offset estimate.
//!
//! Every clip controller reconciles against "corrected now": the local wall
//! clock plus the most recent offset estimate produced by the clock sync
//! client. The estimate lives in a [`ClockOffset`], a lock-free cell that is
//! written only by completed synchronization rounds and read by any number
//! of controllers. Readers tolerate staleness; they simply see whatever value
//! was stored last.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock time in milliseconds since the Unix epoch.
pub trait WallClock: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> f64;
}

/// The operating system's wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_ms(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}

/// A wall clock derived from tokio's monotonic [`Instant`](tokio::time::Instant).
///
/// It reports `origin_ms` at construction and advances with the tokio clock,
/// so it follows `tokio::time::pause()`/`advance()` in tests and never jumps
/// when the system clock is adjusted.
#[derive(Clone, Debug)]
pub struct InstantClock {
    origin: tokio::time::Instant,
    origin_ms: f64,
}

impl InstantClock {
    /// Create a clock that reads `origin_ms` right now.
    pub fn new(origin_ms: f64) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            origin_ms,
        }
    }

    /// Create a clock anchored to the current system time.
    pub fn from_system() -> Self {
        Self::new(SystemClock.now_ms())
    }
}

impl WallClock for InstantClock {
    fn now_ms(&self) -> f64 {
        self.origin_ms + self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Shared estimate of `remote_now - local_now` in milliseconds.
///
/// Cloning shares the underlying cell. The value is stored as `f64` bits in
/// an `AtomicU64`, so reads and writes are single atomic operations.
#[derive(Clone)]
pub struct ClockOffset {
    bits: Arc<AtomicU64>,
}

impl ClockOffset {
    /// Create an estimate initialised to zero (local clock assumed correct).
    pub fn new() -> Self {
        Self::with_value(0.0)
    }

    pub fn with_value(offset_ms: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(offset_ms.to_bits())),
        }
    }

    /// Current estimate in milliseconds.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Replace the estimate. Non-finite values are ignored.
    pub fn set(&self, offset_ms: f64) {
        if !offset_ms.is_finite() {
            tracing::warn!(offset_ms, "Ignoring non-finite clock offset");
            return;
        }
        self.bits.store(offset_ms.to_bits(), Ordering::Relaxed);
    }
}

impl Default for ClockOffset {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClockOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClockOffset").field(&self.get()).finish()
    }
}

/// Local wall clock corrected by the shared offset estimate.
#[derive(Clone, Debug)]
pub struct SyncedClock {
    source: Arc<dyn WallClock>,
    offset: ClockOffset,
}

impl SyncedClock {
    pub fn new(source: Arc<dyn WallClock>, offset: ClockOffset) -> Self {
        Self { source, offset }
    }

    /// A synced clock over the system clock with a fresh zero offset.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock), ClockOffset::new())
    }

    /// Corrected "now" in milliseconds: local wall time plus offset.
    pub fn now_ms(&self) -> f64 {
        self.source.now_ms() + self.offset.get()
    }

    /// Uncorrected local wall time.
    pub fn local_now_ms(&self) -> f64 {
        self.source.now_ms()
    }

    pub fn offset(&self) -> &ClockOffset {
        &self.offset
    }

    pub fn source(&self) -> &Arc<dyn WallClock> {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn offset_initial_value_is_zero() {
        let offset = ClockOffset::new();
        assert_eq!(offset.get(), 0.0);
    }

    #[test]
    fn offset_is_shared_between_clones() {
        let a = ClockOffset::new();
        let b = a.clone();
        a.set(-1234.5);
        assert_eq!(b.get(), -1234.5);
    }

    #[test]
    fn offset_rejects_nan() {
        let offset = ClockOffset::with_value(42.0);
        offset.set(f64::NAN);
        offset.set(f64::INFINITY);
        assert_eq!(offset.get(), 42.0);
    }

    #[test]
    fn system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_ms() > 1_577_836_800_000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn instant_clock_follows_paused_tokio_time() {
        let clock = InstantClock::new(10_000.0);
        assert!((clock.now_ms() - 10_000.0).abs() < 1e-6);

        tokio::time::advance(Duration::from_millis(250)).await;
        assert!((clock.now_ms() - 10_250.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn synced_clock_applies_offset() {
        let offset = ClockOffset::new();
        let clock = SyncedClock::new(Arc::new(InstantClock::new(1_000.0)), offset.clone());
        assert!((clock.now_ms() - 1_000.0).abs() < 1e-6);

        offset.set(500.0);
        assert!((clock.now_ms() - 1_500.0).abs() < 1e-6);
        assert!((clock.local_now_ms() - 1_000.0).abs() < 1e-6);
    }
}
