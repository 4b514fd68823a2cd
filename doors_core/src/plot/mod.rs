//! Result and scenario plotter.
//!
//! Independent of the stepping path: parses recorded telemetry and scenario
//! markers, splits them into scenario ranges and draws charts.

mod chart;
mod ranges;
mod telemetry;

pub use chart::{time_text, Plot, YRange};
pub use ranges::{scenario_ranges, Control, PrimaryDoor, ScenarioRange, MANUAL};
pub use telemetry::{
    from_csv, parse_fields, parse_markers, parse_results, summarize, to_csv, Arrivals, Field, Record,
    ScenarioMarker, TelemetryPoint, TelemetryRow,
};
