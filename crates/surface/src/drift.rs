//! Drift classification for temporal clips.
//!
//! `delta = position - target`. Three bands:
//!
//! | `|delta|`                    | action                                  |
//! |------------------------------|-----------------------------------------|
//! | `<= target_threshold`        | on course, play at the timeline rate    |
//! | `<= max_threshold`, rate > 0 | nudge the playback rate towards target  |
//! | otherwise                    | seek slightly ahead of the target       |

use ss_common::DriftConfig;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Correction {
    OnCourse,
    /// Play at `rate` until the gap closes, roughly `time_to_intercept_ms` from now.
    Nudge { rate: f64, time_to_intercept_ms: f64 },
    Seek { target_ms: f64 },
}

/// Rate adjustment for a given drift: `sign(delta) * (|delta| / max)^p * max_adjust`.
pub fn rate_adjustment(delta_ms: f64, config: &DriftConfig) -> f64 {
    let scaled = (delta_ms.abs() / config.max_threshold_ms).powf(config.smoothing_exponent);
    delta_ms.signum() * scaled * config.max_rate_adjustment
}

/// Classify a drift of `delta_ms` from the timeline's `t_ms` at `rate`.
pub fn classify(delta_ms: f64, t_ms: f64, rate: f64, config: &DriftConfig) -> Correction {
    let magnitude = delta_ms.abs();

    if magnitude <= config.target_threshold_ms {
        return Correction::OnCourse;
    }

    if magnitude <= config.max_threshold_ms && rate > 0.0 {
        let adjusted = (rate - rate_adjustment(delta_ms, config)).max(0.0);
        let closing = rate - adjusted;
        if closing != 0.0 {
            return Correction::Nudge {
                rate: adjusted,
                time_to_intercept_ms: delta_ms / closing,
            };
        }
    }

    Correction::Seek {
        target_ms: t_ms + rate * config.seek_lookahead_ms,
    }
}

/// Predicted time until a surface playing at `surface_rate` meets a timeline
/// advancing at `rate`, given the current `delta_ms`. Non-positive or
/// infinite values mean the gap is not closing.
pub fn time_to_intercept(delta_ms: f64, rate: f64, surface_rate: f64) -> f64 {
    delta_ms / (rate - surface_rate)
}

/// Shortest signed distance between two positions on a loop of `duration_ms`.
pub fn wrap_delta(delta_ms: f64, duration_ms: f64) -> f64 {
    if duration_ms <= 0.0 {
        return delta_ms;
    }
    let wrapped = delta_ms.rem_euclid(duration_ms);
    if wrapped > duration_ms / 2.0 {
        wrapped - duration_ms
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio() -> DriftConfig {
        DriftConfig::audio()
    }

    #[test]
    fn ten_ms_is_on_course() {
        assert_eq!(classify(10.0, 1_000.0, 1.0, &audio()), Correction::OnCourse);
        assert_eq!(classify(-10.0, 1_000.0, 1.0, &audio()), Correction::OnCourse);
        assert!(matches!(
            classify(10.5, 1_000.0, 1.0, &audio()),
            Correction::Nudge { .. }
        ));
    }

    #[test]
    fn just_over_one_second_seeks() {
        assert_eq!(
            classify(1000.1, 1_000.0, 1.0, &audio()),
            Correction::Seek { target_ms: 1_200.0 }
        );
        assert!(matches!(
            classify(1000.0, 1_000.0, 1.0, &audio()),
            Correction::Nudge { .. }
        ));
    }

    #[test]
    fn ahead_slows_down_behind_speeds_up() {
        match classify(250.0, 1_000.0, 1.0, &audio()) {
            Correction::Nudge {
                rate,
                time_to_intercept_ms,
            } => {
                // sqrt(0.25) * 0.2
                assert!((rate - 0.9).abs() < 1e-9);
                assert!((time_to_intercept_ms - 2_500.0).abs() < 1e-6);
            }
            other => panic!("expected nudge, got {:?}", other),
        }
        match classify(-250.0, 1_000.0, 1.0, &audio()) {
            Correction::Nudge {
                rate,
                time_to_intercept_ms,
            } => {
                assert!((rate - 1.1).abs() < 1e-9);
                assert!((time_to_intercept_ms - 2_500.0).abs() < 1e-6);
            }
            other => panic!("expected nudge, got {:?}", other),
        }
    }

    #[test]
    fn video_nudges_harder() {
        let Correction::Nudge { rate, .. } = classify(250.0, 1_000.0, 1.0, &DriftConfig::video()) else {
            panic!("expected nudge");
        };
        assert!((rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn paused_timeline_seeks_instead_of_nudging() {
        assert_eq!(
            classify(100.0, 1_000.0, 0.0, &audio()),
            Correction::Seek { target_ms: 1_000.0 }
        );
    }

    #[test]
    fn adjusted_rate_never_negative() {
        let config = DriftConfig {
            max_rate_adjustment: 0.5,
            ..audio()
        };
        let Correction::Nudge { rate, time_to_intercept_ms } = classify(900.0, 1_000.0, 0.25, &config) else {
            panic!("expected nudge");
        };
        assert_eq!(rate, 0.0);
        assert!((time_to_intercept_ms - 3_600.0).abs() < 1e-6);
    }

    #[test]
    fn smoothing_is_sublinear() {
        let small = rate_adjustment(100.0, &audio());
        let large = rate_adjustment(400.0, &audio());
        assert!((large / small - 2.0).abs() < 1e-9);
        assert!(rate_adjustment(-100.0, &audio()) < 0.0);
    }

    #[test]
    fn intercept_sign() {
        assert!(time_to_intercept(100.0, 1.0, 0.9) > 0.0);
        assert!(time_to_intercept(100.0, 1.0, 1.1) < 0.0);
    }

    #[test]
    fn wrapped_delta_takes_short_way_round() {
        assert_eq!(wrap_delta(9_990.0, 10_000.0), -10.0);
        assert_eq!(wrap_delta(-9_990.0, 10_000.0), 10.0);
        assert_eq!(wrap_delta(30.0, 10_000.0), 30.0);
        assert_eq!(wrap_delta(30.0, 0.0), 30.0);
    }
}
