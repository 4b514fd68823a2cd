//! Harness configuration, loadable from a JSON file.

use crate::error::{Result, SimError};
use crate::network::FaultPlan;
use crate::server::ServerConfig;
use doors_core::{MonitorConfig, RendererLayout};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub server: ServerConfig,
    pub monitor: MonitorConfig,

    /// Link faults for the interactive monitor
    pub faults: FaultPlan,

    pub layout: RendererLayout,
}

impl SimConfig {
    /// Parses a JSON document; missing sections keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<()> {
        if !(self.layout.width > 0.0 && self.layout.height > 0.0) {
            return Err(SimError::config(format!(
                "canvas must have a positive size, not {}x{}",
                self.layout.width, self.layout.height
            )));
        }
        if !(0.0..=1.0).contains(&self.faults.poll_loss) {
            return Err(SimError::config(format!(
                "poll_loss must be within [0, 1], not {}",
                self.faults.poll_loss
            )));
        }
        self.server.geometry.build()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = SimConfig::from_json(
            r#"{"server": {"seconds_per_step": 0.5}, "monitor": {"policy": {"out_of_sync_fatal": true}}}"#,
        )
        .unwrap();

        assert_eq!(config.server.seconds_per_step, 0.5);
        assert_eq!(config.server.geometry.revolver_granularity, 16);
        assert!(config.monitor.policy.out_of_sync_fatal);
        assert_eq!(config.faults, FaultPlan::default());
        assert_eq!(config.layout, RendererLayout::default());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(SimConfig::from_json("{}").unwrap(), SimConfig::default());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            SimConfig::from_json(r#"{"faults": {"poll_loss": 1.5}}"#),
            Err(SimError::Config(_))
        ));
        assert!(matches!(
            SimConfig::from_json(r#"{"server": {"geometry": {"revolver_granularity": 12}}}"#),
            Err(SimError::Doors(_))
        ));
        assert!(matches!(SimConfig::from_json("{"), Err(SimError::Json(_))));
        assert!(matches!(SimConfig::load("/nonexistent/doors.json"), Err(SimError::Io(_))));
    }
}
