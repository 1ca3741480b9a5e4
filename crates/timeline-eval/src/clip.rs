//! Per-kind clip evaluation with defaults, activity, and scheduling queries.

use crate::keyframe::{evaluate_properties, evaluate_temporal, evaluate_temporal_before};
use crate::types::{ClipState, Keyframe, PropertyMap, PropertyValue};

pub const DEFAULT_OPACITY: f64 = 1.0;
pub const DEFAULT_Z_INDEX: f64 = 0.0;
pub const DEFAULT_VOLUME: f64 = 1.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ImageProperties {
    pub opacity: f64,
    pub z_index: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AudioProperties {
    pub t: f64,
    pub rate: f64,
    pub volume: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VideoProperties {
    pub t: f64,
    pub rate: f64,
    pub volume: f64,
    pub opacity: f64,
    pub z_index: f64,
}

impl VideoProperties {
    /// The temporal and audible subset, shared with audio clips.
    pub fn audio(&self) -> AudioProperties {
        AudioProperties {
            t: self.t,
            rate: self.rate,
            volume: self.volume,
        }
    }
}

/// Evaluated properties of a clip, by kind.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum EvaluatedProperties {
    Image(ImageProperties),
    Audio(AudioProperties),
    Video(VideoProperties),
}

/// A future keyframe that re-anchors the media position.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TemporalReset {
    /// Timeline timestamp of the keyframe.
    pub at: i64,
    /// Media position the keyframe sets.
    pub t: f64,
    /// Where the media would be just before the keyframe fires.
    pub position_before: f64,
}

/// Timestamp of the first keyframe, `null` markers included.
pub fn first_timestamp(keyframes: &[Keyframe]) -> Option<i64> {
    keyframes.first().map(|kf| kf.timestamp)
}

/// Whether a clip is active at `time`.
///
/// A clip is active from its first keyframe on, except while the latest
/// keyframe at or before `time` (in list order) is a `null` marker.
pub fn is_active(keyframes: &[Keyframe], time: f64) -> bool {
    match first_timestamp(keyframes) {
        Some(first) if (first as f64) <= time => {}
        _ => return false,
    }

    keyframes
        .iter()
        .filter(|kf| (kf.timestamp as f64) <= time)
        .last()
        .map(|kf| !kf.is_inactive())
        .unwrap_or(false)
}

/// Timestamp of the first keyframe strictly after `time`.
pub fn next_keyframe_after(keyframes: &[Keyframe], time: f64) -> Option<i64> {
    keyframes
        .iter()
        .map(|kf| kf.timestamp)
        .filter(|&ts| (ts as f64) > time)
        .min()
}

/// The next keyframe after `time` that sets `t`, with the media position it
/// interrupts.
pub fn next_reset(keyframes: &[Keyframe], time: f64) -> Option<TemporalReset> {
    let (at, t) = keyframes.iter().find_map(|kf| {
        if (kf.timestamp as f64) <= time {
            return None;
        }
        kf.effect
            .as_ref()
            .and_then(|e| e.set_number("t"))
            .map(|t| (kf.timestamp, t))
    })?;
    let position_before = evaluate_temporal_before(keyframes, at)?.t;
    Some(TemporalReset {
        at,
        t,
        position_before,
    })
}

fn number_or(props: &PropertyMap, key: &str, default: f64) -> f64 {
    props.get(key).and_then(PropertyValue::as_f64).unwrap_or(default)
}

fn unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Image properties at `time`, or `None` if the clip is inactive.
pub fn evaluate_image(keyframes: &[Keyframe], time: f64) -> Option<ImageProperties> {
    if !is_active(keyframes, time) {
        return None;
    }
    let props = evaluate_properties(keyframes, time);
    Some(ImageProperties {
        opacity: unit(number_or(&props, "opacity", DEFAULT_OPACITY)),
        z_index: number_or(&props, "zIndex", DEFAULT_Z_INDEX),
    })
}

/// Audio properties at `time`, or `None` if the clip is inactive.
pub fn evaluate_audio(keyframes: &[Keyframe], time: f64) -> Option<AudioProperties> {
    if !is_active(keyframes, time) {
        return None;
    }
    let temporal = evaluate_temporal(keyframes, time)?;
    let props = evaluate_properties(keyframes, time);
    Some(AudioProperties {
        t: temporal.t,
        rate: temporal.rate.max(0.0),
        volume: unit(number_or(&props, "volume", DEFAULT_VOLUME)),
    })
}

/// Video properties at `time`, or `None` if the clip is inactive.
pub fn evaluate_video(keyframes: &[Keyframe], time: f64) -> Option<VideoProperties> {
    let audio = evaluate_audio(keyframes, time)?;
    let props = evaluate_properties(keyframes, time);
    Some(VideoProperties {
        t: audio.t,
        rate: audio.rate,
        volume: audio.volume,
        opacity: unit(number_or(&props, "opacity", DEFAULT_OPACITY)),
        z_index: number_or(&props, "zIndex", DEFAULT_Z_INDEX),
    })
}

/// Evaluate any clip at `time`.
pub fn evaluate_clip(clip: &ClipState, time: f64) -> Option<EvaluatedProperties> {
    match clip {
        ClipState::Image(c) => evaluate_image(&c.keyframes, time).map(EvaluatedProperties::Image),
        ClipState::Audio(c) => evaluate_audio(&c.keyframes, time).map(EvaluatedProperties::Audio),
        ClipState::Video(c) => evaluate_video(&c.keyframes, time).map(EvaluatedProperties::Video),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Fit, ImageClip, KeyframeEffect, VideoClip};

    fn play_from_zero(at: i64) -> Keyframe {
        Keyframe::new(at, KeyframeEffect::new().set("t", 0.0).set("rate", 1.0))
    }

    #[test]
    fn inactive_before_first_keyframe() {
        let kfs = vec![play_from_zero(1_000)];
        assert!(!is_active(&kfs, 999.0));
        assert!(is_active(&kfs, 1_000.0));
        assert_eq!(evaluate_audio(&kfs, 500.0), None);
    }

    #[test]
    fn null_keyframe_deactivates_until_next_keyframe() {
        let kfs = vec![
            play_from_zero(0),
            Keyframe::inactive(100),
            Keyframe::new(200, KeyframeEffect::new().set("t", 50.0)),
        ];
        assert!(is_active(&kfs, 50.0));
        assert!(!is_active(&kfs, 100.0));
        assert!(!is_active(&kfs, 150.0));
        assert!(is_active(&kfs, 200.0));
        assert_eq!(evaluate_audio(&kfs, 250.0).unwrap().t, 100.0);
    }

    #[test]
    fn image_defaults() {
        let kfs = vec![Keyframe::new(0, KeyframeEffect::new())];
        assert_eq!(
            evaluate_image(&kfs, 10.0),
            Some(ImageProperties {
                opacity: 1.0,
                z_index: 0.0
            })
        );
    }

    #[test]
    fn image_fades_in() {
        let kfs = vec![
            Keyframe::new(0, KeyframeEffect::new().set("opacity", 0.0).set("zIndex", 3.0)),
            Keyframe::new(1_000, KeyframeEffect::new().lerp("opacity", 1.0)),
        ];
        let props = evaluate_image(&kfs, 250.0).unwrap();
        assert!((props.opacity - 0.25).abs() < 1e-9);
        assert_eq!(props.z_index, 3.0);
    }

    #[test]
    fn volume_is_clamped() {
        let kfs = vec![Keyframe::new(0, KeyframeEffect::new().set("t", 0.0).set("volume", 4.0))];
        assert_eq!(evaluate_audio(&kfs, 0.0).unwrap().volume, 1.0);
    }

    #[test]
    fn video_combines_temporal_and_visual() {
        let clip = ClipState::Video(VideoClip {
            file: "a.mp4".into(),
            audio_output: String::new(),
            fit: Fit::Cover,
            keyframes: vec![
                Keyframe::new(0, KeyframeEffect::new().set("t", 0.0).set("rate", 1.0).set("volume", 0.0)),
                Keyframe::new(100, KeyframeEffect::new().lerp("volume", 1.0)),
            ],
        });
        match evaluate_clip(&clip, 50.0) {
            Some(EvaluatedProperties::Video(v)) => {
                assert_eq!(v.t, 50.0);
                assert_eq!(v.rate, 1.0);
                assert!((v.volume - 0.5).abs() < 1e-9);
                assert_eq!(v.opacity, 1.0);
            }
            other => panic!("expected video properties, got {:?}", other),
        }
    }

    #[test]
    fn image_clip_evaluates_through_enum() {
        let clip = ClipState::Image(ImageClip {
            file: "a.png".into(),
            fit: Fit::Contain,
            keyframes: vec![Keyframe::new(10, KeyframeEffect::new())],
        });
        assert_eq!(evaluate_clip(&clip, 0.0), None);
        assert!(matches!(evaluate_clip(&clip, 10.0), Some(EvaluatedProperties::Image(_))));
    }

    #[test]
    fn next_keyframe_is_strictly_after() {
        let kfs = vec![play_from_zero(0), Keyframe::inactive(500)];
        assert_eq!(next_keyframe_after(&kfs, 0.0), Some(500));
        assert_eq!(next_keyframe_after(&kfs, 500.0), None);
    }

    #[test]
    fn next_reset_reports_loop_point() {
        let kfs = vec![
            play_from_zero(0),
            play_from_zero(10_000),
            play_from_zero(20_000),
        ];
        let reset = next_reset(&kfs, 12_000.0).unwrap();
        assert_eq!(reset.at, 20_000);
        assert_eq!(reset.t, 0.0);
        assert_eq!(reset.position_before, 10_000.0);
        assert_eq!(next_reset(&kfs, 20_000.0), None);
    }
}
