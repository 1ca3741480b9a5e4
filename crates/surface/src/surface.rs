//! The rendering surface capability consumed by clip controllers.

use std::fmt;

use ss_common::SurfaceResult;
use ss_timeline_eval::{ClipKind, Fit};
use tokio::sync::oneshot;

/// Opaque id of one live playback element.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle(pub u64);

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything a controller reads back from a surface in one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceSnapshot {
    pub source: String,
    pub audio_output: String,
    pub fit: Fit,
    pub volume: f64,
    pub opacity: f64,
    pub z_index: f64,
    /// Current playback position in milliseconds.
    pub position_ms: f64,
    /// Media duration, once the backend knows it.
    pub duration_ms: Option<f64>,
    pub playback_rate: f64,
    pub paused: bool,
    pub looping: bool,
}

/// Resolves once a seek issued through [`Surface::seek`] has landed.
#[derive(Debug)]
pub struct SeekCompletion {
    rx: oneshot::Receiver<()>,
    done: bool,
}

impl SeekCompletion {
    pub fn new(rx: oneshot::Receiver<()>) -> Self {
        Self { rx, done: false }
    }

    /// A completion that has already fired.
    pub fn completed() -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        Self::new(rx)
    }

    /// Non-blocking check. A dropped sender counts as complete, so a surface
    /// that disappears mid-seek never wedges the controller.
    pub fn is_complete(&mut self) -> bool {
        if !self.done {
            self.done = !matches!(self.rx.try_recv(), Err(oneshot::error::TryRecvError::Empty));
        }
        self.done
    }
}

/// A backend that can create and drive playback elements.
///
/// Commands are fire-and-forget from the controller's point of view: an
/// `Err` is logged and the command is issued again on a later tick.
/// Implementations must not block.
pub trait Surface: Send + Sync {
    fn create(&self, clip_id: &str, kind: ClipKind) -> SurfaceResult<SurfaceHandle>;

    /// Release the element. Unknown handles are ignored.
    fn destroy(&self, handle: SurfaceHandle);

    /// Whether the element is still mounted where the controller put it.
    fn is_attached(&self, handle: SurfaceHandle) -> bool;

    fn snapshot(&self, handle: SurfaceHandle) -> SurfaceResult<SurfaceSnapshot>;

    fn set_source(&self, handle: SurfaceHandle, source: &str) -> SurfaceResult<()>;
    fn set_audio_output(&self, handle: SurfaceHandle, sink: &str) -> SurfaceResult<()>;
    fn set_fit(&self, handle: SurfaceHandle, fit: Fit) -> SurfaceResult<()>;
    fn set_volume(&self, handle: SurfaceHandle, volume: f64) -> SurfaceResult<()>;
    fn set_opacity(&self, handle: SurfaceHandle, opacity: f64) -> SurfaceResult<()>;
    fn set_z_index(&self, handle: SurfaceHandle, z_index: f64) -> SurfaceResult<()>;
    fn set_playback_rate(&self, handle: SurfaceHandle, rate: f64) -> SurfaceResult<()>;
    fn set_loop(&self, handle: SurfaceHandle, looping: bool) -> SurfaceResult<()>;

    fn play(&self, handle: SurfaceHandle) -> SurfaceResult<()>;
    fn pause(&self, handle: SurfaceHandle) -> SurfaceResult<()>;
    fn seek(&self, handle: SurfaceHandle, position_ms: f64) -> SurfaceResult<SeekCompletion>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_fires_once_sent() {
        let (tx, rx) = oneshot::channel();
        let mut completion = SeekCompletion::new(rx);
        assert!(!completion.is_complete());
        tx.send(()).unwrap();
        assert!(completion.is_complete());
        assert!(completion.is_complete());
    }

    #[test]
    fn dropped_sender_completes() {
        let (tx, rx) = oneshot::channel::<()>();
        let mut completion = SeekCompletion::new(rx);
        drop(tx);
        assert!(completion.is_complete());
        assert!(SeekCompletion::completed().is_complete());
    }
}
