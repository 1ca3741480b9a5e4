//! Audio and video clips: drift-corrected playback.
//!
//! Both kinds share the temporal reconciliation below. Video additionally
//! reconciles opacity and z-order, and uses a more aggressive rate nudge
//! ([`DriftConfig::video`](ss_common::DriftConfig::video)).

use std::time::Duration;

use ss_common::{DriftConfig, EngineConfig};
use ss_timeline_eval::{
    evaluate_audio, evaluate_video, next_reset, AudioClip, AudioProperties, Keyframe, VideoClip,
};
use tracing::{debug, trace};

use crate::controller::{millis, NextTick, Tick};
use crate::drift::{classify, time_to_intercept, wrap_delta, Correction};
use crate::image::apply_visual;
use crate::surface::{SeekCompletion, SurfaceSnapshot};

/// Correction state carried between ticks.
#[derive(Debug, Default)]
pub(crate) struct MediaState {
    pub pending_seek: Option<SeekCompletion>,
    pub convergence: Option<Convergence>,
    pub ended: bool,
}

/// The prediction made by the last rate nudge.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct Convergence {
    pub delta_abs: f64,
    pub time_to_intercept_ms: f64,
}

pub(crate) fn reconcile_audio(
    tick: &Tick<'_>,
    clip: &AudioClip,
    snapshot: &SurfaceSnapshot,
    state: &mut MediaState,
) -> NextTick {
    match evaluate_audio(&clip.keyframes, tick.now_ms) {
        Some(props) => reconcile_temporal(tick, &clip.keyframes, props, &tick.config.audio, snapshot, state),
        None => NextTick::After(tick.config.default_poll()),
    }
}

pub(crate) fn reconcile_video(
    tick: &Tick<'_>,
    clip: &VideoClip,
    snapshot: &SurfaceSnapshot,
    state: &mut MediaState,
) -> NextTick {
    let Some(props) = evaluate_video(&clip.keyframes, tick.now_ms) else {
        return NextTick::After(tick.config.default_poll());
    };
    apply_visual(tick, snapshot, props.opacity, props.z_index);
    reconcile_temporal(tick, &clip.keyframes, props.audio(), &tick.config.video, snapshot, state)
}

/// Whether the timeline restarts the media from zero exactly when it would
/// run out, so the surface can loop on its own.
pub(crate) fn loops_at_end(keyframes: &[Keyframe], now_ms: f64, duration_ms: f64, epsilon_ms: f64) -> bool {
    next_reset(keyframes, now_ms)
        .is_some_and(|reset| reset.t == 0.0 && (reset.position_before - duration_ms).abs() <= epsilon_ms)
}

pub(crate) fn convergence_delay(time_to_intercept_ms: f64, drift: &DriftConfig, config: &EngineConfig) -> Duration {
    millis(time_to_intercept_ms * drift.convergence_fraction)
        .max(config.min_poll())
        .min(config.default_poll())
}

fn reconcile_temporal(
    tick: &Tick<'_>,
    keyframes: &[Keyframe],
    props: AudioProperties,
    drift: &DriftConfig,
    snapshot: &SurfaceSnapshot,
    state: &mut MediaState,
) -> NextTick {
    let AudioProperties { t, rate, volume } = props;
    let surface = tick.surface;
    let handle = tick.handle;

    if snapshot.volume != volume {
        tick.command("set_volume", surface.set_volume(handle, volume));
    }

    let duration = snapshot.duration_ms.filter(|d| *d > 0.0);
    let looping = duration.is_some_and(|d| loops_at_end(keyframes, tick.now_ms, d, drift.loop_epsilon_ms));
    if snapshot.looping != looping {
        tick.command("set_loop", surface.set_loop(handle, looping));
    }

    if let Some(d) = duration {
        if !looping && t > d {
            if !state.ended {
                debug!(clip = %tick.clip_id, t, duration_ms = d, "Clip reached end of media");
                state.ended = true;
            }
            state.convergence = None;
            if !snapshot.paused {
                tick.command("pause", surface.pause(handle));
            }
            return NextTick::Never;
        }
    }
    state.ended = false;

    if rate > 0.0 && snapshot.paused {
        tick.command("play", surface.play(handle));
    } else if rate == 0.0 && !snapshot.paused {
        tick.command("pause", surface.pause(handle));
    }

    let mut delta = snapshot.position_ms - t;
    if let (true, Some(d)) = (looping, duration) {
        delta = wrap_delta(delta, d);
    }

    if let Some(previous) = state.convergence.take() {
        if delta.abs() > drift.target_threshold_ms {
            let tti = time_to_intercept(delta, rate, snapshot.playback_rate);
            if delta.abs() < previous.delta_abs && tti > 0.0 && tti < previous.time_to_intercept_ms {
                trace!(clip = %tick.clip_id, delta_ms = delta, time_to_intercept_ms = tti, "Converging");
                state.convergence = Some(Convergence {
                    delta_abs: delta.abs(),
                    time_to_intercept_ms: tti,
                });
                return NextTick::After(convergence_delay(tti, drift, tick.config));
            }
            debug!(clip = %tick.clip_id, delta_ms = delta, "Drift did not close as predicted, re-classifying");
        }
    }

    match classify(delta, t, rate, drift) {
        Correction::OnCourse => {
            if rate > 0.0 && snapshot.playback_rate != rate {
                tick.command("set_playback_rate", surface.set_playback_rate(handle, rate));
            }
            NextTick::After(tick.config.default_poll())
        }
        Correction::Nudge {
            rate: adjusted,
            time_to_intercept_ms,
        } => {
            if snapshot.playback_rate != adjusted {
                tick.command("set_playback_rate", surface.set_playback_rate(handle, adjusted));
            }
            debug!(
                clip = %tick.clip_id,
                delta_ms = delta,
                rate = adjusted,
                time_to_intercept_ms,
                "Nudging playback rate"
            );
            state.convergence = Some(Convergence {
                delta_abs: delta.abs(),
                time_to_intercept_ms,
            });
            NextTick::After(convergence_delay(time_to_intercept_ms, drift, tick.config))
        }
        Correction::Seek { target_ms } => {
            if rate > 0.0 && snapshot.playback_rate != rate {
                tick.command("set_playback_rate", surface.set_playback_rate(handle, rate));
            }
            let target_ms = match (looping, duration) {
                (true, Some(d)) => target_ms.rem_euclid(d),
                _ => target_ms,
            };
            match surface.seek(handle, target_ms) {
                Ok(completion) => {
                    debug!(clip = %tick.clip_id, delta_ms = delta, target_ms, "Seeking");
                    state.pending_seek = Some(completion);
                    NextTick::After(tick.config.seek_poll())
                }
                Err(e) => {
                    debug!(clip = %tick.clip_id, error = %e, "Seek failed");
                    NextTick::After(tick.config.default_poll())
                }
            }
        }
    }
}
