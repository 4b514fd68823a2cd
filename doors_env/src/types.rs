//! Wire types shared by the monitor, the transports and the step server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies one of the two doors sharing a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorName {
    Revolver,
    Swinger,
}

impl DoorName {
    /// Both doors, in paint and report order.
    pub const ALL: [DoorName; 2] = [DoorName::Revolver, DoorName::Swinger];

    /// Returns the wire name of the door.
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorName::Revolver => "revolver",
            DoorName::Swinger => "swinger",
        }
    }
}

impl fmt::Display for DoorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DoorName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "revolver" | "revolving" => Ok(DoorName::Revolver),
            "swinger" | "swinging" => Ok(DoorName::Swinger),
            _ => Err(format!("Unknown door: {}", s)),
        }
    }
}

/// The mutable part of a door: everything a resync replaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorState {
    /// People waiting to enter
    pub arriving: u32,

    /// Occupancy per cell
    pub occupied: Vec<bool>,

    /// Discrete position index
    pub position: u32,
}

/// One door's share of a step command.
///
/// The state fields describe the door **before** the step, so a monitor can
/// adopt them and replay the step itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorReport {
    /// People who arrived in this step
    pub arrived: u32,

    /// Revolver outcome: steps rotated (0 or 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate: Option<i32>,

    /// Swinger outcome: door angle at step end (radians)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,

    pub arriving: u32,
    pub occupied: Vec<bool>,
    pub position: u32,
}

impl DoorReport {
    /// Returns the pre-step door state carried by this report.
    pub fn state(&self) -> DoorState {
        DoorState {
            arriving: self.arriving,
            occupied: self.occupied.clone(),
            position: self.position,
        }
    }
}

/// A step command batch as returned by the step source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCommand {
    /// Step sequence number
    pub step: u64,

    /// Milliseconds until this step's motion should be settled (0 = boundary race)
    pub duration: u64,

    pub revolver: DoorReport,
    pub swinger: DoorReport,
}

impl StepCommand {
    /// Returns the report for one door.
    pub fn door(&self, name: DoorName) -> &DoorReport {
        match name {
            DoorName::Revolver => &self.revolver,
            DoorName::Swinger => &self.swinger,
        }
    }

    /// Encodes the command in the JSON wire format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes a command from the JSON wire format.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Control parameters sent along with a scenario start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlParams {
    /// Target cycling rate of the door
    pub turns_per_sec: f64,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self { turns_per_sec: 0.2 }
    }
}
