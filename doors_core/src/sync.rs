//! Reconciliation of the local door shadow with the authoritative step source.
//!
//! The synchronizer is a pure state machine: it receives step commands and
//! mutates the local doors, but never touches the network or the canvas.
//!
//! ```text
//!            load ok                    reply handled
//!   Idle ------------> Polling{reset} ---------------> Polling
//!    ^                      |                            |
//!    +---- stop / fatal ----+----------------------------+
//! ```
//!
//! Handling one reply:
//!
//! 1. Stopped while in flight: the reply is discarded.
//! 2. `duration == 0`: boundary race, poll again; nothing is consumed.
//! 3. Pending reset: adopt the reported state and step number.
//! 4. Step number mismatch: report a missed step and adopt the reported state.
//! 5. Replay the step locally and cross-check the outcome.

use crate::doors::{Doors, Motions};
use crate::error::{DoorsError, Result};
use crate::fault::{Fault, FaultReporter, StepReport, StepSource};
use doors_env::{DoorName, StepCommand};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Whether the monitor is polling, and whether the next reply must be
/// adopted wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    Idle,
    Polling { reset_pending: bool },
}

/// What to do when a local replay disagrees with the step source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    /// Halt on mismatch instead of adopting the reported state
    pub out_of_sync_fatal: bool,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self::self_healing()
    }
}

impl SyncPolicy {
    /// Reports mismatches and heals them by replaying from the reported state.
    pub fn self_healing() -> Self {
        Self {
            out_of_sync_fatal: false,
        }
    }

    /// Halts the monitor on the first mismatch.
    pub fn strict() -> Self {
        Self {
            out_of_sync_fatal: true,
        }
    }
}

/// Result of handling one step reply.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Not polling; no request was made
    Idle,
    /// Stopped while the request was in flight
    Discarded,
    /// The reply raced a step boundary; poll again immediately
    Race,
    /// A step was consumed and is ready to animate
    Stepped(StepReport),
}

/// Step-number bookkeeping and outcome cross-checking.
#[derive(Debug, Clone, PartialEq)]
pub struct Synchronizer {
    phase: SyncPhase,

    /// Number of the next step expected from the source
    local_step: u64,

    policy: SyncPolicy,
}

impl Synchronizer {
    pub fn new(policy: SyncPolicy) -> Self {
        Self {
            phase: SyncPhase::Idle,
            local_step: 0,
            policy,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn local_step(&self) -> u64 {
        self.local_step
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.phase, SyncPhase::Polling { .. })
    }

    /// Begins polling with a pending reset. Returns `false` if already polling.
    pub fn start(&mut self) -> bool {
        match self.phase {
            SyncPhase::Idle => {
                self.phase = SyncPhase::Polling {
                    reset_pending: true,
                };
                true
            }
            SyncPhase::Polling { .. } => false,
        }
    }

    /// Stops polling; replies still in flight will be discarded.
    pub fn stop(&mut self) {
        self.phase = SyncPhase::Idle;
    }

    /// Handles one reply from the step source.
    pub fn apply(&mut self, doors: &mut Doors, command: &StepCommand, reporter: &mut FaultReporter) -> Result<PollOutcome> {
        let reset_pending = match self.phase {
            SyncPhase::Idle => {
                debug!(step = command.step, "discarding reply after stop");
                return Ok(PollOutcome::Discarded);
            }
            SyncPhase::Polling { reset_pending } => reset_pending,
        };

        if command.duration == 0 {
            debug!(step = command.step, "step boundary race");
            return Ok(PollOutcome::Race);
        }

        if reset_pending {
            info!(step = command.step, "adopting remote door state");
            self.resync(doors, command, reporter)?;
            self.phase = SyncPhase::Polling {
                reset_pending: false,
            };
        } else if command.step != self.local_step {
            reporter.report(Fault::missed_step(self.local_step, command.step));
            self.resync(doors, command, reporter)?;
        }

        let mut motions = replay(doors, command);
        if let Some(door) = mismatch(doors, command, motions) {
            if self.policy.out_of_sync_fatal {
                reporter.report(Fault::out_of_sync(door, command.step, true));
                self.stop();
                return Err(DoorsError::OutOfSync {
                    door,
                    step: command.step,
                });
            }
            reporter.report(Fault::out_of_sync(door, command.step, false));
            self.resync(doors, command, reporter)?;
            motions = replay(doors, command);
        }

        self.local_step += 1;
        Ok(PollOutcome::Stepped(StepReport {
            source: StepSource::Monitor,
            step: self.local_step,
            motions,
            duration_ms: command.duration as f64,
        }))
    }

    /// Replaces the local doors with the reported pre-step state.
    fn resync(&mut self, doors: &mut Doors, command: &StepCommand, reporter: &mut FaultReporter) -> Result<()> {
        for door in DoorName::ALL {
            if let Err(err) = doors.door_mut(door).absorb(&command.door(door).state()) {
                reporter.report(Fault::transport(format!("Bad step reply: {}", err)).into_fatal());
                self.stop();
                return Err(err);
            }
        }
        self.local_step = command.step;
        Ok(())
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(SyncPolicy::default())
    }
}

fn replay(doors: &mut Doors, command: &StepCommand) -> Motions {
    for door in DoorName::ALL {
        doors.door_mut(door).add_arrivals(command.door(door).arrived);
    }
    doors.step_all()
}

/// First door whose local outcome differs from the reported one.
fn mismatch(doors: &Doors, command: &StepCommand, motions: Motions) -> Option<DoorName> {
    let revolver_ok = command
        .revolver
        .rotate
        .map_or(true, |rotate| rotate == motions.revolver);
    if !revolver_ok {
        return Some(DoorName::Revolver);
    }
    let swinger_ok = command
        .swinger
        .angle
        .map_or(true, |angle| angle == doors.swinger.angle());
    if !swinger_ok {
        return Some(DoorName::Swinger);
    }
    None
}
