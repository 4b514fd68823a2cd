//! Transport abstraction for the authoritative step source.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{ControlParams, DoorName, StepCommand};

/// Abstraction for calls between the monitor and the step server.
///
/// # Implementations
///
/// - **Production**: an HTTP client against the door server
/// - **Simulation**: `SimTransport` (in-process server with fault injection)
///   and `ScriptedTransport` (canned replies)
///
/// # Call Flow
///
/// ```text
/// Monitor                      Transport                    Server
///   |-- start(door, scenario) ---->|------------------------->| queue scenario
///   |-- next_step() -------------->|------------------------->|
///   |<---------- StepCommand ------|<-- last step + duration -|
///   |-- arrive(door) ------------->|------------------------->| arriving += 1
/// ```
///
/// Requests are never cancelled by the caller; a late reply is simply
/// discarded by whoever issued it.
#[async_trait]
pub trait StepTransport: Send + Sync + 'static {
    /// Asks the server to (re)start a named scenario on one door.
    async fn start(
        &self,
        door: DoorName,
        scenario: &str,
        control: &ControlParams,
    ) -> Result<(), EnvError>;

    /// Notifies the server that a person arrived at a door.
    async fn arrive(&self, door: DoorName) -> Result<(), EnvError>;

    /// Requests the latest step command batch.
    async fn next_step(&self) -> Result<StepCommand, EnvError>;
}
