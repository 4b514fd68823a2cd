//! Error types for the simulation harness.

use doors_core::DoorsError;
use thiserror::Error;

/// Errors raised by the step server, the config loader and the CLI.
#[derive(Debug, Error)]
pub enum SimError {
    /// `start` named a scenario the server has no script for
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Doors(#[from] DoorsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
