//! Error types for the environment abstraction.

use thiserror::Error;

/// Errors that can occur while talking to the step source.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The request failed at the transport layer (connection refused, HTTP 500, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The step source is not reachable (simulated outage)
    #[error("Step source unreachable: {0}")]
    Unreachable(String),

    /// Command serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates an unreachable error.
    pub fn unreachable(what: impl std::fmt::Display) -> Self {
        Self::Unreachable(what.to_string())
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
