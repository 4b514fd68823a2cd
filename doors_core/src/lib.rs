//! # Doors Core
//!
//! Visualizes a revolving and a swinging door, either by stepping the door
//! models locally or by mirroring an authoritative, discretely stepped
//! simulation.
//!
//! ## Architecture
//!
//! ```text
//!                 +-----------+         +-------------------+
//!  PlayerCommand  |  Player   |-------->|                   |
//!  -------------->| (local)   |  Doors  |    Renderer<C>    |--> Canvas
//!                 +-----------+ Motions |  (interpolating)  |
//!                 +-----------+-------->|                   |
//!  MonitorCommand |  Monitor  |         +-------------------+
//!  -------------->| (remote)  |<-- StepTransport (poll / start / arrive)
//!                 +-----+-----+
//!                       |
//!                 Synchronizer (reset, missed step, out of sync)
//! ```
//!
//! Exactly one driver owns the doors and the renderer at a time; switch
//! drivers with `into_parts`. Both drivers report through a [`FaultReporter`]
//! that logs via `tracing` and forwards [`Event`]s to an mpsc channel.
//!
//! The [`plot`] module is separate from the stepping path and charts recorded
//! telemetry.

pub mod doors;
pub mod error;
pub mod fault;
pub mod monitor;
pub mod player;
pub mod plot;
pub mod render;
pub mod scenario;
pub mod sync;

#[cfg(test)]
mod testing;

pub use doors::{close_to, Door, DoorGeometry, Doors, Motion, Motions, RevolvingDoor, SwingingDoor};
pub use error::{DoorsError, Result};
pub use fault::{Event, Fault, FaultKind, FaultReporter, StepReport, StepSource};
pub use monitor::{Monitor, MonitorCommand, MonitorConfig};
pub use player::{PlayState, Player, PlayerCommand};
pub use render::{Canvas, Color, RecordingCanvas, Renderer, RendererLayout};
pub use scenario::ScenarioScript;
pub use sync::{PollOutcome, SyncPhase, SyncPolicy, Synchronizer};
