//! JSON exporter for replaying a simulated monitor session.
//!
//! Exports the display list of every settled step together with the faults
//! reported along the way and the server's telemetry, so a run can be
//! redrawn and charted offline.

use doors_core::plot::{ScenarioMarker, TelemetryRow};
use doors_core::render::DrawCommand;
use doors_core::{Fault, Motions};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// One settled step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Monitor step counter after the step
    pub step: u64,

    pub motions: Motions,

    /// Display list of the final, resting frame
    pub commands: Vec<DrawCommand>,

    /// Faults reported since the previous frame
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<SimEvent>,
}

/// A reported fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl From<&Fault> for SimEvent {
    fn from(fault: &Fault) -> Self {
        Self {
            message: fault.to_string(),
            level: Some(if fault.fatal { "error" } else { "warn" }.to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Raw server telemetry rows
    pub telemetry: Vec<TelemetryRow>,

    /// Server scenario changes
    pub markers: Vec<ScenarioMarker>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            telemetry: Vec::new(),
            markers: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Attaches the server logs.
    pub fn set_telemetry(&mut self, telemetry: Vec<TelemetryRow>, markers: Vec<ScenarioMarker>) {
        self.telemetry = telemetry;
        self.markers = markers;
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doors_core::render::Color;
    use doors_env::DoorName;

    #[test]
    fn test_export_serializes_frames_and_events() {
        let mut export = SimExport::new("nominal", 42);
        export.add_frame(SimFrame {
            time_sec: 0.65,
            step: 2,
            motions: Motions { revolver: 1, swinger: 0 },
            commands: vec![DrawCommand::FillRect {
                x: 0.0,
                y: 0.0,
                width: 1.0,
                height: 1.0,
                color: Color::Gray,
            }],
            events: vec![SimEvent::from(&Fault::out_of_sync(DoorName::Revolver, 3, true))],
        });
        export.finalize(false, Some("halted".to_string()));

        let json = export.to_json().unwrap();
        assert!(json.contains("\"op\": \"fill_rect\""));
        assert!(json.contains("\"level\": \"error\""));

        let back: SimExport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.duration_sec, 0.65);
        assert_eq!(back.frames[0].events[0].level.as_deref(), Some("error"));
        assert_eq!(back.failure_reason.as_deref(), Some("halted"));
    }
}
