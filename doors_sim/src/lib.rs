//! Door Visualizer Deterministic Simulation Harness
//!
//! This crate runs the door monitor against an in-process step server on a
//! virtual clock, so every boundary race, lost reply and desync is
//! reproducible from a single seed.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: the virtual clock advances only on `sleep` and `next_frame`
//! - **Network**: the link adds latency, drops polls and fails calls on demand
//! - **Randomness**: all entropy is derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (Virtual Clock + Seeded RNG)              │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼────┐  SimTransport ┌────▼───────┐                   │
//! │  │ Monitor │──────────────►│ StepServer │                   │
//! │  │ + Doors │◄──────────────│ (timer,    │                   │
//! │  └────┬────┘  StepCommand  │  scripts,  │                   │
//! │       │                    │  logs)     │                   │
//! │  RecordingCanvas           └────────────┘                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use doors_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let runner = ScenarioRunner::new(42).with_duration(30.0);
//! let result = runner.run(ScenarioId::BoundaryRace).await;
//! assert!(result.passed);
//! ```

mod config;
mod context;
mod error;
mod exporter;
mod network;
mod runner;
pub mod scenarios;
mod server;

pub use config::SimConfig;
pub use context::{SimContext, SIM_FRAME};
pub use error::{Result, SimError};
pub use exporter::{SimEvent, SimExport, SimFrame};
pub use network::{FaultPlan, LinkController, ScriptedTransport, SimTransport};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use server::{ServerConfig, StepRecord, StepServer, BUILTIN_SCRIPTS, NOMINAL_TEMPS};
