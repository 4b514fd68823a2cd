//! Fault and event surface shared by the player and the monitor.
//!
//! Drivers never swallow problems: every fault is logged through `tracing`
//! and forwarded to whoever holds the event receiver. Fatal faults are
//! reported first and then abort the operation that raised them.

use crate::doors::Motions;
use doors_env::DoorName;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, warn};

/// Category of a reported fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    /// A remote call failed
    Transport,
    /// The remote step number differed from the local counter
    MissedStep,
    /// Local replay disagreed with the remote outcome
    OutOfSync,
    /// Illegal duration, step interval or geometry
    Configuration,
}

/// A user-visible problem raised by a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    pub fatal: bool,
}

impl Fault {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Transport,
            message: message.into(),
            fatal: false,
        }
    }

    pub fn missed_step(expected: u64, received: u64) -> Self {
        Self {
            kind: FaultKind::MissedStep,
            message: format!("Missed step {} (server reported {})", expected, received),
            fatal: false,
        }
    }

    pub fn out_of_sync(door: DoorName, step: u64, fatal: bool) -> Self {
        let name = match door {
            DoorName::Revolver => "Revolver",
            DoorName::Swinger => "Swinger",
        };
        Self {
            kind: FaultKind::OutOfSync,
            message: format!("{} out of sync on step {}", name, step),
            fatal,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Configuration,
            message: message.into(),
            fatal: true,
        }
    }

    /// Marks the fault as aborting its operation.
    pub fn into_fatal(mut self) -> Self {
        self.fatal = true;
        self
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fatal {
            write!(f, "Fatal: {}", self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

/// Which driver completed a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepSource {
    Player,
    Monitor,
}

/// A completed, settled step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub source: StepSource,

    /// Step counter after the step
    pub step: u64,

    pub motions: Motions,

    /// Animation length in milliseconds
    pub duration_ms: f64,
}

/// Everything a driver tells its observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Stepped(StepReport),
    Fault(Fault),
}

/// Logs faults and forwards them, together with step notifications, to an
/// optional event channel.
#[derive(Debug, Clone, Default)]
pub struct FaultReporter {
    events: Option<UnboundedSender<Event>>,
    reported: usize,
}

impl FaultReporter {
    /// Creates a reporter that forwards to `events`.
    pub fn new(events: UnboundedSender<Event>) -> Self {
        Self {
            events: Some(events),
            reported: 0,
        }
    }

    /// Creates a reporter together with its event receiver.
    pub fn channel() -> (Self, UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// A reporter that only logs.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Logs and forwards a fault.
    pub fn report(&mut self, fault: Fault) {
        if fault.fatal {
            error!(kind = ?fault.kind, "{}", fault);
        } else {
            warn!(kind = ?fault.kind, "{}", fault);
        }
        self.reported += 1;
        self.send(Event::Fault(fault));
    }

    /// Notifies observers that a step settled.
    pub fn stepped(&mut self, report: StepReport) {
        debug!(step = report.step, ?report.motions, "step settled");
        self.send(Event::Stepped(report));
    }

    /// Number of faults reported so far.
    pub fn reported(&self) -> usize {
        self.reported
    }

    fn send(&self, event: Event) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                debug!("event receiver dropped");
            }
        }
    }
}
