//! Chaos scenarios for the monitor.

use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// SIM-001: Clean link, both doors busy
    Nominal,

    /// SIM-002: Server timer fires late, polls race step boundaries
    BoundaryRace,

    /// SIM-003: Round trip longer than a step
    SlowLink,

    /// SIM-004: Polls fail, the operator reloads
    FlakyLink,

    /// SIM-005: Arrival never reaches the server, mismatch is healed
    LostArrival,

    /// SIM-006: Arrival never reaches the server, mismatch halts the monitor
    StrictSync,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Nominal,
            ScenarioId::BoundaryRace,
            ScenarioId::SlowLink,
            ScenarioId::FlakyLink,
            ScenarioId::LostArrival,
            ScenarioId::StrictSync,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Nominal => "nominal",
            ScenarioId::BoundaryRace => "boundary_race",
            ScenarioId::SlowLink => "slow_link",
            ScenarioId::FlakyLink => "flaky_link",
            ScenarioId::LostArrival => "lost_arrival",
            ScenarioId::StrictSync => "strict_sync",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Nominal => "5ms link, rush and steady scripts, no faults expected",
            ScenarioId::BoundaryRace => "server timer 40ms late, zero-duration replies are re-polled",
            ScenarioId::SlowLink => "700ms round trip, every poll misses steps and resyncs",
            ScenarioId::FlakyLink => "2 forced poll failures plus 5% loss, monitor reloaded after each halt",
            ScenarioId::LostArrival => "failed arrival keeps the local increment, out-of-sync is healed",
            ScenarioId::StrictSync => "failed arrival under the strict policy halts the monitor",
        }
    }

    /// True if the scenario passes by halting on a fatal fault.
    pub fn expects_halt(&self) -> bool {
        matches!(self, ScenarioId::StrictSync)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nominal" | "sim-001" => Ok(ScenarioId::Nominal),
            "boundary_race" | "boundaryrace" | "race" | "sim-002" => Ok(ScenarioId::BoundaryRace),
            "slow_link" | "slowlink" | "sim-003" => Ok(ScenarioId::SlowLink),
            "flaky_link" | "flakylink" | "sim-004" => Ok(ScenarioId::FlakyLink),
            "lost_arrival" | "lostarrival" | "sim-005" => Ok(ScenarioId::LostArrival),
            "strict_sync" | "strictsync" | "sim-006" => Ok(ScenarioId::StrictSync),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
