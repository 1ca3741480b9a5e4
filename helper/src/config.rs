//! Optional JSON config file

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ss_common::{EngineConfig, TimeSyncConfig};
use ss_timeline_eval::SurfaceState;

/// Tuning read from `--config`. Every field may be omitted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    pub engine: EngineConfig,
    pub timesync: TimeSyncConfig,
}

impl HelperConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }
}

/// Read the initial surface state for `serve`. No file means an empty surface.
pub fn load_state(path: Option<&Path>) -> Result<SurfaceState> {
    let Some(path) = path else {
        return Ok(SurfaceState::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read surface state {}", path.display()))?;
    SurfaceState::from_json(&text).with_context(|| format!("Invalid surface state {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: HelperConfig =
            serde_json::from_str(r#"{ "engine": { "default_poll_ms": 250 }, "timesync": { "sample_size": 3 } }"#)
                .unwrap();
        assert_eq!(config.engine.default_poll_ms, 250);
        assert_eq!(config.engine.seek_poll_ms, 10);
        assert_eq!(config.engine.video.max_rate_adjustment, 0.5);
        assert_eq!(config.timesync.sample_size, 3);
        assert_eq!(config.timesync.interval_ms, 60_000);
    }

    #[test]
    fn missing_paths_fall_back() {
        assert_eq!(HelperConfig::load(None).unwrap(), HelperConfig::default());
        assert!(load_state(None).unwrap().is_empty());
    }

    #[test]
    fn unreadable_state_file_is_an_error() {
        let err = load_state(Some(Path::new("/nonexistent/surface.json"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read surface state"));
    }
}
