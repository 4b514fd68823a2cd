//! Error types for the door visualizer core.

use doors_env::{DoorName, EnvError};
use thiserror::Error;

/// Errors raised by door models, drivers and the plotter.
#[derive(Debug, Error)]
pub enum DoorsError {
    /// Illegal model or driver configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Animation duration that can never settle
    #[error("Illegal duration {0}")]
    InvalidDuration(f64),

    /// Player step interval that is not strictly positive
    #[error("Need positive step time, not {0}")]
    InvalidStepInterval(f64),

    /// Door state that violates the model's invariants
    #[error("Invalid {door} state: {message}")]
    InvalidState { door: DoorName, message: String },

    /// Remote call failed
    #[error(transparent)]
    Transport(#[from] EnvError),

    /// Local replay disagreed with the remote outcome under a fatal policy
    #[error("{door} out of sync on step {step}")]
    OutOfSync { door: DoorName, step: u64 },

    /// Telemetry or scenario text could not be parsed
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl DoorsError {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a parse error for a 1-based line number.
    pub fn parse(line: usize, msg: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: msg.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DoorsError>;
