//! In-memory surface backend.
//!
//! Each element behaves like a media element: its position advances with the
//! backing [`WallClock`] at the playback rate while playing, stops at the end
//! of a known duration unless looping, and freezes while a seek is in flight.
//! Test code can reach around the controller to pause, seek, mute, or detach
//! elements, and can count the commands the controller issued.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ss_common::{SurfaceError, SurfaceResult, WallClock};
use ss_timeline_eval::{ClipKind, Fit};
use tokio::sync::oneshot;

use crate::surface::{SeekCompletion, Surface, SurfaceHandle, SurfaceSnapshot};

#[derive(Debug)]
struct Element {
    clip_id: String,
    kind: ClipKind,
    attached: bool,
    source: String,
    audio_output: String,
    fit: Fit,
    volume: f64,
    opacity: f64,
    z_index: f64,
    playback_rate: f64,
    looping: bool,
    paused: bool,
    anchor_position: f64,
    anchor_time: f64,
    seeking: bool,
    seek_generation: u64,
}

impl Element {
    fn new(clip_id: &str, kind: ClipKind, now: f64) -> Self {
        Self {
            clip_id: clip_id.to_string(),
            kind,
            attached: true,
            source: String::new(),
            audio_output: String::new(),
            fit: Fit::default(),
            volume: 1.0,
            opacity: 1.0,
            z_index: 0.0,
            playback_rate: 1.0,
            looping: false,
            paused: true,
            anchor_position: 0.0,
            anchor_time: now,
            seeking: false,
            seek_generation: 0,
        }
    }

    fn raw_position(&self, now: f64) -> f64 {
        if self.paused || self.seeking {
            self.anchor_position
        } else {
            self.anchor_position + (now - self.anchor_time) * self.playback_rate
        }
    }

    fn position(&self, now: f64, duration: Option<f64>) -> f64 {
        let raw = self.raw_position(now);
        match duration {
            Some(d) if d > 0.0 && self.looping => raw.rem_euclid(d),
            Some(d) => raw.clamp(0.0, d),
            None => raw.max(0.0),
        }
    }

    fn ended(&self, now: f64, duration: Option<f64>) -> bool {
        !self.looping && duration.is_some_and(|d| self.raw_position(now) >= d)
    }

    /// Fold elapsed playback into the anchor before changing how it advances.
    fn reanchor(&mut self, now: f64, duration: Option<f64>) {
        self.anchor_position = self.position(now, duration);
        self.anchor_time = now;
    }
}

#[derive(Debug, Default)]
struct SimState {
    next_id: u64,
    elements: BTreeMap<u64, Element>,
    durations: HashMap<String, f64>,
    seek_latency: Duration,
    reject_play: bool,
    mutations: u64,
}

impl SimState {
    fn duration_of(&self, element: &Element) -> Option<f64> {
        self.durations.get(&element.source).copied()
    }

    /// Apply a controller command to a live element and count it.
    fn command<T>(
        &mut self,
        handle: SurfaceHandle,
        now: f64,
        f: impl FnOnce(&mut Element, Option<f64>, f64) -> SurfaceResult<T>,
    ) -> SurfaceResult<T> {
        let duration = self
            .elements
            .get(&handle.0)
            .and_then(|e| self.durations.get(&e.source).copied());
        let element = self
            .elements
            .get_mut(&handle.0)
            .ok_or(SurfaceError::UnknownHandle(handle.0))?;
        let result = f(element, duration, now)?;
        self.mutations += 1;
        Ok(result)
    }
}

/// A [`Surface`] backed by simulated media elements.
///
/// Clones share the same elements.
#[derive(Clone, Debug)]
pub struct SimulatedSurface {
    clock: Arc<dyn WallClock>,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedSurface {
    pub fn new(clock: Arc<dyn WallClock>) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Declare the length of a source. Unknown sources have no duration.
    pub fn set_duration(&self, source: &str, duration_ms: f64) {
        self.state.lock().durations.insert(source.to_string(), duration_ms);
    }

    /// How long seeks take to land. Zero completes them immediately.
    pub fn set_seek_latency(&self, latency: Duration) {
        self.state.lock().seek_latency = latency;
    }

    /// Make `play` fail, as an autoplay policy would.
    pub fn set_reject_play(&self, reject: bool) {
        self.state.lock().reject_play = reject;
    }

    /// Commands successfully applied so far.
    pub fn mutations(&self) -> u64 {
        self.state.lock().mutations
    }

    pub fn element_count(&self) -> usize {
        self.state.lock().elements.len()
    }

    /// Live element for `clip_id`, if any.
    pub fn handle_of(&self, clip_id: &str) -> Option<SurfaceHandle> {
        self.state
            .lock()
            .elements
            .iter()
            .find(|(_, e)| e.clip_id == clip_id)
            .map(|(id, _)| SurfaceHandle(*id))
    }

    /// Every live element with the clip it belongs to, in creation order.
    pub fn elements(&self) -> Vec<(SurfaceHandle, String, ClipKind)> {
        self.state
            .lock()
            .elements
            .iter()
            .map(|(id, e)| (SurfaceHandle(*id), e.clip_id.clone(), e.kind))
            .collect()
    }

    fn interfere(&self, handle: SurfaceHandle, f: impl FnOnce(&mut Element, Option<f64>, f64)) {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let duration = state
            .elements
            .get(&handle.0)
            .and_then(|e| state.durations.get(&e.source).copied());
        if let Some(element) = state.elements.get_mut(&handle.0) {
            f(element, duration, now);
        }
    }

    /// Pause the element behind the controller's back.
    pub fn interfere_pause(&self, handle: SurfaceHandle) {
        self.interfere(handle, |e, duration, now| {
            e.reanchor(now, duration);
            e.paused = true;
        });
    }

    /// Jump the element to `position_ms` behind the controller's back.
    pub fn interfere_seek(&self, handle: SurfaceHandle, position_ms: f64) {
        self.interfere(handle, |e, _, now| {
            e.anchor_position = position_ms;
            e.anchor_time = now;
        });
    }

    pub fn interfere_volume(&self, handle: SurfaceHandle, volume: f64) {
        self.interfere(handle, |e, _, _| e.volume = volume);
    }

    pub fn interfere_opacity(&self, handle: SurfaceHandle, opacity: f64) {
        self.interfere(handle, |e, _, _| e.opacity = opacity);
    }

    /// Unmount the element without destroying it.
    pub fn detach(&self, handle: SurfaceHandle) {
        self.interfere(handle, |e, _, _| e.attached = false);
    }
}

impl Surface for SimulatedSurface {
    fn create(&self, clip_id: &str, kind: ClipKind) -> SurfaceResult<SurfaceHandle> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.elements.insert(id, Element::new(clip_id, kind, now));
        state.mutations += 1;
        Ok(SurfaceHandle(id))
    }

    fn destroy(&self, handle: SurfaceHandle) {
        let mut state = self.state.lock();
        if state.elements.remove(&handle.0).is_some() {
            state.mutations += 1;
        }
    }

    fn is_attached(&self, handle: SurfaceHandle) -> bool {
        self.state
            .lock()
            .elements
            .get(&handle.0)
            .is_some_and(|e| e.attached)
    }

    fn snapshot(&self, handle: SurfaceHandle) -> SurfaceResult<SurfaceSnapshot> {
        let now = self.clock.now_ms();
        let state = self.state.lock();
        let element = state
            .elements
            .get(&handle.0)
            .ok_or(SurfaceError::UnknownHandle(handle.0))?;
        let duration = state.duration_of(element);
        Ok(SurfaceSnapshot {
            source: element.source.clone(),
            audio_output: element.audio_output.clone(),
            fit: element.fit,
            volume: element.volume,
            opacity: element.opacity,
            z_index: element.z_index,
            position_ms: element.position(now, duration),
            duration_ms: duration,
            playback_rate: element.playback_rate,
            paused: element.paused || element.ended(now, duration),
            looping: element.looping,
        })
    }

    fn set_source(&self, handle: SurfaceHandle, source: &str) -> SurfaceResult<()> {
        let now = self.clock.now_ms();
        self.state.lock().command(handle, now, |e, _, now| {
            e.source = source.to_string();
            e.anchor_position = 0.0;
            e.anchor_time = now;
            Ok(())
        })
    }

    fn set_audio_output(&self, handle: SurfaceHandle, sink: &str) -> SurfaceResult<()> {
        let now = self.clock.now_ms();
        self.state.lock().command(handle, now, |e, _, _| {
            e.audio_output = sink.to_string();
            Ok(())
        })
    }

    fn set_fit(&self, handle: SurfaceHandle, fit: Fit) -> SurfaceResult<()> {
        let now = self.clock.now_ms();
        self.state.lock().command(handle, now, |e, _, _| {
            e.fit = fit;
            Ok(())
        })
    }

    fn set_volume(&self, handle: SurfaceHandle, volume: f64) -> SurfaceResult<()> {
        let now = self.clock.now_ms();
        self.state.lock().command(handle, now, |e, _, _| {
            e.volume = volume;
            Ok(())
        })
    }

    fn set_opacity(&self, handle: SurfaceHandle, opacity: f64) -> SurfaceResult<()> {
        let now = self.clock.now_ms();
        self.state.lock().command(handle, now, |e, _, _| {
            e.opacity = opacity;
            Ok(())
        })
    }

    fn set_z_index(&self, handle: SurfaceHandle, z_index: f64) -> SurfaceResult<()> {
        let now = self.clock.now_ms();
        self.state.lock().command(handle, now, |e, _, _| {
            e.z_index = z_index;
            Ok(())
        })
    }

    fn set_playback_rate(&self, handle: SurfaceHandle, rate: f64) -> SurfaceResult<()> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(SurfaceError::Rejected(format!("invalid playback rate {rate}")));
        }
        let now = self.clock.now_ms();
        self.state.lock().command(handle, now, |e, duration, now| {
            e.reanchor(now, duration);
            e.playback_rate = rate;
            Ok(())
        })
    }

    fn set_loop(&self, handle: SurfaceHandle, looping: bool) -> SurfaceResult<()> {
        let now = self.clock.now_ms();
        self.state.lock().command(handle, now, |e, duration, now| {
            e.reanchor(now, duration);
            e.looping = looping;
            Ok(())
        })
    }

    fn play(&self, handle: SurfaceHandle) -> SurfaceResult<()> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        if state.reject_play {
            return Err(SurfaceError::Rejected("playback not allowed".to_string()));
        }
        state.command(handle, now, |e, duration, now| {
            e.reanchor(now, duration);
            e.paused = false;
            Ok(())
        })
    }

    fn pause(&self, handle: SurfaceHandle) -> SurfaceResult<()> {
        let now = self.clock.now_ms();
        self.state.lock().command(handle, now, |e, duration, now| {
            e.reanchor(now, duration);
            e.paused = true;
            Ok(())
        })
    }

    fn seek(&self, handle: SurfaceHandle, position_ms: f64) -> SurfaceResult<SeekCompletion> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let latency = state.seek_latency;
        let generation = state.command(handle, now, |e, duration, now| {
            e.anchor_position = match duration {
                Some(d) => position_ms.clamp(0.0, d),
                None => position_ms.max(0.0),
            };
            e.anchor_time = now;
            e.seek_generation += 1;
            e.seeking = !latency.is_zero();
            Ok(e.seek_generation)
        })?;

        if latency.is_zero() {
            return Ok(SeekCompletion::completed());
        }

        let (tx, rx) = oneshot::channel();
        let shared = self.state.clone();
        let clock = self.clock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            if let Some(e) = shared.lock().elements.get_mut(&handle.0) {
                if e.seek_generation == generation {
                    e.seeking = false;
                    e.anchor_time = clock.now_ms();
                }
            }
            let _ = tx.send(());
        });
        Ok(SeekCompletion::new(rx))
    }
}
