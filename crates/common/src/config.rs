//! Configuration structs for clip controllers, drift correction, and clock sync.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Drift-correction tuning for one media kind (audio or video).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Drift at or below this is "on course" (inclusive).
    pub target_threshold_ms: f64,
    /// Drift above this is corrected by seeking instead of a rate nudge.
    pub max_threshold_ms: f64,
    /// Largest playback-rate change a nudge may apply.
    pub max_rate_adjustment: f64,
    /// Exponent of the smoothing curve `(|delta| / max_threshold)^p`.
    pub smoothing_exponent: f64,
    /// How far ahead of the target a corrective seek lands, scaled by rate.
    pub seek_lookahead_ms: f64,
    /// Fraction of the predicted intercept time to wait before re-checking.
    pub convergence_fraction: f64,
    /// Tolerance when matching a `t = 0` reset keyframe to end-of-media.
    pub loop_epsilon_ms: f64,
}

impl DriftConfig {
    /// Tuning used for audio clips.
    pub fn audio() -> Self {
        Self {
            max_rate_adjustment: 0.2,
            ..Self::base()
        }
    }

    /// Tuning used for video clips.
    pub fn video() -> Self {
        Self {
            max_rate_adjustment: 0.5,
            ..Self::base()
        }
    }

    fn base() -> Self {
        Self {
            target_threshold_ms: 10.0,
            max_threshold_ms: 1_000.0,
            max_rate_adjustment: 0.2,
            smoothing_exponent: 0.5,
            seek_lookahead_ms: 200.0,
            convergence_fraction: 0.7,
            loop_epsilon_ms: 50.0,
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self::audio()
    }
}

/// Clip controller configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Steady-state re-poll delay.
    pub default_poll_ms: u64,
    /// Re-poll delay while a seek is in flight.
    pub seek_poll_ms: u64,
    /// Shortest delay a convergence prediction may schedule.
    pub min_poll_ms: u64,
    pub audio: DriftConfig,
    pub video: DriftConfig,
}

impl EngineConfig {
    pub fn default_poll(&self) -> Duration {
        Duration::from_millis(self.default_poll_ms)
    }

    pub fn seek_poll(&self) -> Duration {
        Duration::from_millis(self.seek_poll_ms)
    }

    pub fn min_poll(&self) -> Duration {
        Duration::from_millis(self.min_poll_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_poll_ms: 1_000,
            seek_poll_ms: 10,
            min_poll_ms: 10,
            audio: DriftConfig::audio(),
            video: DriftConfig::video(),
        }
    }
}

/// Clock synchronization client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSyncConfig {
    /// Delay between the end of one round and the start of the next.
    pub interval_ms: u64,
    /// Probes per round.
    pub sample_size: usize,
    /// Independent timeout for each probe.
    pub probe_timeout_ms: u64,
}

impl TimeSyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            sample_size: 5,
            probe_timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_and_video_differ_only_in_rate_adjustment() {
        let audio = DriftConfig::audio();
        let video = DriftConfig::video();
        assert_eq!(audio.max_rate_adjustment, 0.2);
        assert_eq!(video.max_rate_adjustment, 0.5);
        assert_eq!(
            DriftConfig { max_rate_adjustment: 0.0, ..audio },
            DriftConfig { max_rate_adjustment: 0.0, ..video }
        );
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "default_poll_ms": 500, "video": { "seek_lookahead_ms": 300 } }"#)
                .unwrap();
        assert_eq!(config.default_poll_ms, 500);
        assert_eq!(config.seek_poll_ms, 10);
        assert_eq!(config.video.seek_lookahead_ms, 300.0);
        // Missing nested fields come from `DriftConfig::default()`
        assert_eq!(config.video.target_threshold_ms, 10.0);
    }

    #[test]
    fn timesync_defaults() {
        let config = TimeSyncConfig::default();
        assert_eq!(config.sample_size, 5);
        assert_eq!(config.probe_timeout(), Duration::from_secs(10));
    }
}
