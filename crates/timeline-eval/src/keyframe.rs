//! Keyframe evaluation: held and linearly interpolated properties, and the
//! integrated media position of temporal clips.
//!
//! Keyframes are walked in list order rather than re-sorted, so duplicate
//! timestamps resolve by position: the last assignment at or before the query
//! time is the "before" value, the first future `lerp` is the target.

use std::collections::BTreeMap;

use crate::types::{Keyframe, PropertyMap, PropertyValue};

/// Media position and playback rate of an audio/video clip.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TemporalPosition {
    /// Position within the media, in milliseconds.
    pub t: f64,
    /// Playback speed multiplier; 0 is paused.
    pub rate: f64,
}

#[derive(Default)]
struct Span<'a> {
    before: Option<(i64, &'a PropertyValue)>,
    after: Option<(i64, &'a PropertyValue)>,
}

/// Evaluate every property referenced by `keyframes` at `time`.
///
/// Properties whose first assignment lies in the future are absent from the
/// result; callers apply their own defaults. `null` keyframes are skipped.
///
/// When a non-numeric property sits between a `before` and a future `lerp`
/// target, the `before` value is held until the target's timestamp.
pub fn evaluate_properties(keyframes: &[Keyframe], time: f64) -> PropertyMap {
    let mut spans: BTreeMap<&str, Span<'_>> = BTreeMap::new();

    for kf in keyframes {
        let Some(effect) = &kf.effect else { continue };

        if kf.at_or_before(time) {
            // lerp first: a `set` on the same keyframe replaces the lerp target
            for (property, value) in effect.lerp.iter().chain(effect.set.iter()) {
                spans.entry(property.as_str()).or_default().before = Some((kf.timestamp, value));
            }
        } else {
            for (property, value) in &effect.lerp {
                let span = spans.entry(property.as_str()).or_default();
                if span.after.is_none() {
                    span.after = Some((kf.timestamp, value));
                }
            }
        }
    }

    spans
        .into_iter()
        .filter_map(|(property, span)| resolve(&span, time).map(|v| (property.to_string(), v)))
        .collect()
}

fn resolve(span: &Span<'_>, time: f64) -> Option<PropertyValue> {
    match (span.before, span.after) {
        (Some((_, before)), None) => Some(before.clone()),
        (Some((t0, _)), Some((t1, after))) if t0 == t1 => Some(after.clone()),
        (Some((t0, before)), Some((t1, after))) => match (before.as_f64(), after.as_f64()) {
            (Some(v0), Some(v1)) => {
                let t0 = t0 as f64;
                let t1 = t1 as f64;
                Some(PropertyValue::Number(v0 + (time - t0) * (v1 - v0) / (t1 - t0)))
            }
            _ => Some(before.clone()),
        },
        (None, _) => None,
    }
}

/// Integrate the media position of a temporal clip up to `time`.
///
/// Only `set` assignments of `t` and `rate` take part; temporal properties
/// are never interpolated. A `set` of `t` re-anchors the position (and the
/// rate, if also set). A `set` of `rate` alone first advances the anchor to
/// the keyframe using the previous rate, then re-times it.
///
/// Returns `None` if `time` precedes the first keyframe. The anchor starts at
/// the first keyframe with `t = 0, rate = 1` unless that keyframe sets them.
pub fn evaluate_temporal(keyframes: &[Keyframe], time: f64) -> Option<TemporalPosition> {
    integrate(keyframes, time, |kf| kf.at_or_before(time))
}

/// Media position at `instant`, using only keyframes strictly before it.
///
/// This is where the media would be just as a keyframe at `instant` fires,
/// which is how loop points are recognised.
pub fn evaluate_temporal_before(keyframes: &[Keyframe], instant: i64) -> Option<TemporalPosition> {
    integrate(keyframes, instant as f64, |kf| kf.timestamp < instant)
}

fn integrate(
    keyframes: &[Keyframe],
    time: f64,
    include: impl Fn(&Keyframe) -> bool,
) -> Option<TemporalPosition> {
    let active = keyframes.iter().filter(|kf| kf.effect.is_some());
    let first = active.clone().next()?;
    if !include(first) {
        return None;
    }

    let mut anchor_real = first.timestamp as f64;
    let mut anchor_media = 0.0;
    let mut rate = 1.0;

    for kf in active {
        if !include(kf) {
            break;
        }
        let Some(effect) = &kf.effect else { continue };
        let ts = kf.timestamp as f64;

        match (effect.set_number("t"), effect.set_number("rate")) {
            (Some(t), new_rate) => {
                anchor_real = ts;
                anchor_media = t;
                if let Some(r) = new_rate {
                    rate = r;
                }
            }
            (None, Some(new_rate)) => {
                anchor_media += (ts - anchor_real) * rate;
                anchor_real = ts;
                rate = new_rate;
            }
            (None, None) => {}
        }
    }

    Some(TemporalPosition {
        t: anchor_media + (time - anchor_real) * rate,
        rate,
    })
}
