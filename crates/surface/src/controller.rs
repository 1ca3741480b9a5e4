//! Clip controllers: one task per clip, reconciling a surface element
//! towards the clip's timeline.
//!
//! Every tick re-reads the element and re-asserts the whole desired state,
//! issuing a command only where the reported value differs. A paused, muted,
//! seeked, or destroyed element is therefore put right by the next tick no
//! matter who changed it.
//!
//! Lifecycle: `Uninitialized -> Active <-> Inactive -> TornDown`. The element
//! is created when the clip becomes active and released when it becomes
//! inactive, when the controller is destroyed, or when its slot is detached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ss_common::{EngineConfig, SurfaceResult, SyncedClock};
use ss_timeline_eval::{is_active, next_keyframe_after, ClipKind, ClipState};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::image;
use crate::media::{self, MediaState};
use crate::surface::{Surface, SurfaceHandle, SurfaceSnapshot};

/// Membership of a controller in its orchestrator.
///
/// Cleared by the orchestrator when the clip is removed. A controller that
/// finds its attachment cleared tears itself down.
#[derive(Clone, Debug)]
pub struct Attachment(Arc<AtomicBool>);

impl Attachment {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_attached(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn detach(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for Attachment {
    fn default() -> Self {
        Self::new()
    }
}

/// When the controller task should tick next.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum NextTick {
    After(Duration),
    /// Only a state change wakes the controller.
    Never,
    Stop,
}

/// Convert fractional milliseconds to a sleep duration.
pub(crate) fn millis(ms: f64) -> Duration {
    Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX)
}

/// What a kind-specific reconcile step needs for one tick.
pub(crate) struct Tick<'a> {
    pub surface: &'a dyn Surface,
    pub handle: SurfaceHandle,
    pub clip_id: &'a str,
    pub now_ms: f64,
    pub config: &'a EngineConfig,
}

impl Tick<'_> {
    /// Log a failed command. The next tick issues it again.
    pub fn command(&self, name: &'static str, result: SurfaceResult<()>) {
        if let Err(e) = result {
            debug!(clip = %self.clip_id, command = name, error = %e, "Surface command failed");
        }
    }
}

struct ControllerCore {
    clip_id: String,
    state: ClipState,
    surface: Arc<dyn Surface>,
    clock: SyncedClock,
    config: EngineConfig,
    attachment: Attachment,
    handle: Option<SurfaceHandle>,
    media: MediaState,
    torn_down: bool,
}

impl ControllerCore {
    fn tick(&mut self) -> NextTick {
        if self.torn_down {
            return NextTick::Stop;
        }
        if !self.attachment.is_attached() {
            debug!(clip = %self.clip_id, "Clip slot detached, tearing down");
            self.teardown();
            return NextTick::Stop;
        }

        if let Some(seek) = self.media.pending_seek.as_mut() {
            if !seek.is_complete() {
                trace!(clip = %self.clip_id, "Waiting for seek");
                return NextTick::After(self.config.seek_poll());
            }
            trace!(clip = %self.clip_id, "Seek landed");
            self.media.pending_seek = None;
        }

        let now = self.clock.now_ms();
        if !is_active(self.state.keyframes(), now) {
            if let Some(handle) = self.handle.take() {
                debug!(clip = %self.clip_id, handle = %handle, "Clip inactive, releasing surface");
                self.surface.destroy(handle);
            }
            self.media = MediaState::default();
            let next = match next_keyframe_after(self.state.keyframes(), now) {
                Some(_) => NextTick::After(self.config.default_poll()),
                None => NextTick::Never,
            };
            return self.bounded_by_next_keyframe(next, now);
        }

        let Some(handle) = self.ensure_handle() else {
            return NextTick::After(self.config.default_poll());
        };
        let snapshot = match self.surface.snapshot(handle) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(clip = %self.clip_id, error = %e, "Failed to read surface");
                return NextTick::After(self.config.default_poll());
            }
        };

        let tick = Tick {
            surface: self.surface.as_ref(),
            handle,
            clip_id: &self.clip_id,
            now_ms: now,
            config: &self.config,
        };
        apply_static(&tick, &self.state, &snapshot);
        let next = match &self.state {
            ClipState::Image(clip) => image::reconcile(&tick, clip, &snapshot),
            ClipState::Audio(clip) => media::reconcile_audio(&tick, clip, &snapshot, &mut self.media),
            ClipState::Video(clip) => media::reconcile_video(&tick, clip, &snapshot, &mut self.media),
        };
        self.bounded_by_next_keyframe(next, now)
    }

    /// Never sleep past the next keyframe.
    fn bounded_by_next_keyframe(&self, next: NextTick, now: f64) -> NextTick {
        let Some(at) = next_keyframe_after(self.state.keyframes(), now) else {
            return next;
        };
        let until = millis((at as f64 - now).max(1.0));
        match next {
            NextTick::After(delay) => NextTick::After(delay.min(until)),
            NextTick::Never => NextTick::After(until),
            NextTick::Stop => NextTick::Stop,
        }
    }

    fn ensure_handle(&mut self) -> Option<SurfaceHandle> {
        if let Some(handle) = self.handle {
            if self.surface.is_attached(handle) {
                return Some(handle);
            }
            debug!(clip = %self.clip_id, handle = %handle, "Surface detached out of band, recreating");
            self.surface.destroy(handle);
            self.handle = None;
            self.media = MediaState::default();
        }

        match self.surface.create(&self.clip_id, self.state.kind()) {
            Ok(handle) => {
                debug!(clip = %self.clip_id, kind = %self.state.kind(), handle = %handle, "Clip active, created surface");
                self.handle = Some(handle);
                Some(handle)
            }
            Err(e) => {
                debug!(clip = %self.clip_id, error = %e, "Failed to create surface");
                None
            }
        }
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.surface.destroy(handle);
        }
        self.media = MediaState::default();
    }

    fn teardown(&mut self) {
        self.release();
        self.torn_down = true;
    }
}

/// Source, fit, and audio sink. Set once in practice, but re-checked every
/// tick like everything else.
fn apply_static(tick: &Tick<'_>, state: &ClipState, snapshot: &SurfaceSnapshot) {
    if snapshot.source != state.file() {
        tick.command("set_source", tick.surface.set_source(tick.handle, state.file()));
    }
    if let Some(fit) = state.fit() {
        if snapshot.fit != fit {
            tick.command("set_fit", tick.surface.set_fit(tick.handle, fit));
        }
    }
    if let Some(sink) = state.audio_output() {
        if snapshot.audio_output != sink {
            tick.command("set_audio_output", tick.surface.set_audio_output(tick.handle, sink));
        }
    }
}

async fn run(core: Arc<Mutex<ControllerCore>>, wake: Arc<Notify>) {
    loop {
        let next = core.lock().tick();
        match next {
            NextTick::Stop => break,
            NextTick::After(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = wake.notified() => {}
                }
            }
            NextTick::Never => wake.notified().await,
        }
    }
}

/// Owns the reconciliation task of one clip.
///
/// Dropping the controller destroys it.
pub struct ClipController {
    clip_id: String,
    core: Arc<Mutex<ControllerCore>>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ClipController {
    /// Start controlling `clip_id`. Must be called within a tokio runtime.
    pub fn spawn(
        clip_id: impl Into<String>,
        state: ClipState,
        surface: Arc<dyn Surface>,
        clock: SyncedClock,
        config: EngineConfig,
        attachment: Attachment,
    ) -> Self {
        let clip_id = clip_id.into();
        let core = Arc::new(Mutex::new(ControllerCore {
            clip_id: clip_id.clone(),
            state,
            surface,
            clock,
            config,
            attachment,
            handle: None,
            media: MediaState::default(),
            torn_down: false,
        }));
        let wake = Arc::new(Notify::new());
        let task = tokio::spawn(run(core.clone(), wake.clone()));
        Self {
            clip_id,
            core,
            wake,
            task,
        }
    }

    pub fn clip_id(&self) -> &str {
        &self.clip_id
    }

    pub fn kind(&self) -> ClipKind {
        self.core.lock().state.kind()
    }

    pub fn state(&self) -> ClipState {
        self.core.lock().state.clone()
    }

    /// Current surface element, if the clip is active.
    pub fn handle(&self) -> Option<SurfaceHandle> {
        self.core.lock().handle
    }

    /// Replace the clip's state and reconcile right away. An identical state
    /// is ignored.
    ///
    /// A state of a different kind releases the current element first, and
    /// the next tick creates one of the new kind. [`Orchestrator`] never
    /// relies on this: it recreates the controller instead.
    ///
    /// [`Orchestrator`]: crate::Orchestrator
    pub fn set_state(&self, state: ClipState) {
        {
            let mut core = self.core.lock();
            if core.state == state {
                return;
            }
            if core.state.kind() != state.kind() {
                core.release();
            }
            core.state = state;
            core.media.convergence = None;
        }
        self.wake.notify_one();
    }

    /// Whether the task has exited, through destruction or self-teardown.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the task and release the surface element before returning.
    pub fn destroy(&self) {
        self.task.abort();
        let mut core = self.core.lock();
        if !core.torn_down {
            debug!(clip = %self.clip_id, "Destroying clip controller");
            core.teardown();
        }
    }
}

impl Drop for ClipController {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedSurface;
    use ss_common::{ClockOffset, InstantClock, WallClock};
    use ss_timeline_eval::{ImageClip, Keyframe, KeyframeEffect, VideoClip};

    struct Fixture {
        sim: SimulatedSurface,
        clock: SyncedClock,
    }

    fn fixture() -> Fixture {
        let source: Arc<dyn WallClock> = Arc::new(InstantClock::new(0.0));
        Fixture {
            sim: SimulatedSurface::new(source.clone()),
            clock: SyncedClock::new(source, ClockOffset::new()),
        }
    }

    fn image(start: i64) -> ClipState {
        ClipState::Image(ImageClip {
            file: "logo.png".into(),
            fit: Default::default(),
            keyframes: vec![Keyframe::new(start, KeyframeEffect::new().set("opacity", 0.5))],
        })
    }

    fn spawn(f: &Fixture, state: ClipState, attachment: Attachment) -> ClipController {
        ClipController::spawn(
            "logo",
            state,
            Arc::new(f.sim.clone()),
            f.clock.clone(),
            EngineConfig::default(),
            attachment,
        )
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(-5.0), Duration::ZERO);
        assert_eq!(millis(1.5), Duration::from_micros(1_500));
        assert_eq!(millis(f64::INFINITY), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn creates_surface_when_active() {
        let f = fixture();
        let controller = spawn(&f, image(0), Attachment::new());
        wait(5).await;

        let handle = controller.handle().unwrap();
        let snapshot = f.sim.snapshot(handle).unwrap();
        assert_eq!(snapshot.source, "logo.png");
        assert_eq!(snapshot.opacity, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_first_keyframe() {
        let f = fixture();
        let controller = spawn(&f, image(2_500), Attachment::new());
        wait(2_490).await;
        assert!(controller.handle().is_none());
        wait(20).await;
        assert!(controller.handle().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn null_keyframe_releases_surface() {
        let f = fixture();
        let state = ClipState::Image(ImageClip {
            file: "logo.png".into(),
            fit: Default::default(),
            keyframes: vec![Keyframe::new(0, KeyframeEffect::new()), Keyframe::inactive(300)],
        });
        let controller = spawn(&f, state, Attachment::new());
        wait(100).await;
        assert_eq!(f.sim.element_count(), 1);
        wait(300).await;
        assert_eq!(f.sim.element_count(), 0);
        assert!(controller.handle().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn identical_state_is_ignored() {
        let f = fixture();
        let controller = spawn(&f, image(0), Attachment::new());
        wait(5).await;
        let before = f.sim.mutations();
        controller.set_state(image(0));
        wait(5).await;
        assert_eq!(f.sim.mutations(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn new_state_applies_without_waiting_for_poll() {
        let f = fixture();
        let controller = spawn(&f, image(0), Attachment::new());
        wait(5).await;
        let handle = controller.handle().unwrap();

        let faded = ClipState::Image(ImageClip {
            file: "logo.png".into(),
            fit: Default::default(),
            keyframes: vec![Keyframe::new(0, KeyframeEffect::new().set("opacity", 0.1))],
        });
        controller.set_state(faded);
        wait(1).await;
        assert_eq!(f.sim.snapshot(handle).unwrap().opacity, 0.1);
        assert_eq!(controller.handle(), Some(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn kind_change_swaps_the_element() {
        let f = fixture();
        let controller = spawn(&f, image(0), Attachment::new());
        wait(5).await;
        let first = controller.handle().unwrap();

        let video = ClipState::Video(VideoClip {
            file: "logo.mp4".into(),
            audio_output: String::new(),
            fit: Default::default(),
            keyframes: vec![Keyframe::new(0, KeyframeEffect::new().set("t", 0.0).set("rate", 1.0))],
        });
        controller.set_state(video);
        assert!(f.sim.snapshot(first).is_err());
        wait(5).await;

        let second = controller.handle().unwrap();
        assert_ne!(first, second);
        assert_eq!(f.sim.elements(), vec![(second, "logo".to_string(), ClipKind::Video)]);
        assert_eq!(f.sim.snapshot(second).unwrap().source, "logo.mp4");
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_releases_surface_synchronously() {
        let f = fixture();
        let controller = spawn(&f, image(0), Attachment::new());
        wait(5).await;
        assert_eq!(f.sim.element_count(), 1);

        controller.destroy();
        assert_eq!(f.sim.element_count(), 0);
        wait(1).await;
        assert!(controller.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn detached_slot_tears_down() {
        let f = fixture();
        let attachment = Attachment::new();
        let controller = spawn(&f, image(0), attachment.clone());
        wait(5).await;

        attachment.detach();
        wait(1_100).await;
        assert_eq!(f.sim.element_count(), 0);
        assert!(controller.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn restores_interfered_opacity() {
        let f = fixture();
        let controller = spawn(&f, image(0), Attachment::new());
        wait(5).await;
        let handle = controller.handle().unwrap();

        f.sim.interfere_opacity(handle, 1.0);
        wait(1_100).await;
        assert_eq!(f.sim.snapshot(handle).unwrap().opacity, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn recreates_detached_surface() {
        let f = fixture();
        let controller = spawn(&f, image(0), Attachment::new());
        wait(5).await;
        let first = controller.handle().unwrap();

        f.sim.detach(first);
        wait(1_100).await;
        let second = controller.handle().unwrap();
        assert_ne!(first, second);
        assert_eq!(f.sim.element_count(), 1);
        assert_eq!(f.sim.snapshot(second).unwrap().source, "logo.png");
    }
}
