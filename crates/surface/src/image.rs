//! Image clips: opacity and stacking only.

use ss_timeline_eval::{evaluate_image, ImageClip};

use crate::controller::{NextTick, Tick};
use crate::surface::SurfaceSnapshot;

/// Opacity and z-order, shared with video clips.
pub(crate) fn apply_visual(tick: &Tick<'_>, snapshot: &SurfaceSnapshot, opacity: f64, z_index: f64) {
    if snapshot.opacity != opacity {
        tick.command("set_opacity", tick.surface.set_opacity(tick.handle, opacity));
    }
    if snapshot.z_index != z_index {
        tick.command("set_z_index", tick.surface.set_z_index(tick.handle, z_index));
    }
}

pub(crate) fn reconcile(tick: &Tick<'_>, clip: &ImageClip, snapshot: &SurfaceSnapshot) -> NextTick {
    if let Some(props) = evaluate_image(&clip.keyframes, tick.now_ms) {
        apply_visual(tick, snapshot, props.opacity, props.z_index);
    }
    NextTick::After(tick.config.default_poll())
}
