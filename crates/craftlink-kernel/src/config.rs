use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use craftlink_batch::BatchConfig;
use craftlink_commands::executors::MoveConfig;
use craftlink_events::AggregatorConfig;
use craftlink_state::ScanConfig;
use serde::{Deserialize, Serialize};

/// Every tunable of an agent session. Missing keys take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub batch: BatchConfig,
    pub scan: ScanConfig,
    #[serde(rename = "move")]
    pub movement: MoveConfig,
    /// Group block edits into one build event after this much quiet.
    pub build_quiet_window_ms: u64,
    pub build_max_actions: usize,
    /// Control-loop period used by the daemon.
    pub tick_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let aggregator = AggregatorConfig::default();
        Self {
            batch: BatchConfig::default(),
            scan: ScanConfig::default(),
            movement: MoveConfig::default(),
            build_quiet_window_ms: aggregator.quiet_window.as_millis() as u64,
            build_max_actions: aggregator.max_actions,
            tick_interval_ms: 50,
        }
    }
}

impl SessionConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading session config {path:?}"))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed parsing session config {path:?}"))
    }

    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            quiet_window: Duration::from_millis(self.build_quiet_window_ms),
            max_actions: self.build_max_actions.max(1),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() -> Result<()> {
        let config: SessionConfig = serde_json::from_str(
            r#"{"batch":{"max_events":5},"move":{"speed":2.0},"tick_interval_ms":20}"#,
        )?;
        assert_eq!(config.batch.max_events, 5);
        assert_eq!(config.batch.min_events, 1);
        assert_eq!(config.movement.speed, 2.0);
        assert_eq!(config.scan.max_scan_distance, 10);
        assert_eq!(config.tick_interval(), Duration::from_millis(20));
        Ok(())
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let err = SessionConfig::from_json_file("/nonexistent/craftlink.json").unwrap_err();
        assert!(format!("{err:#}").contains("craftlink.json"));
    }
}
