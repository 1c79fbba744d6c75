//! Error types for the headless bridge

use std::time::Duration;
use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge error types
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No usable way to start the worker was found
    #[error("Cannot launch worker: {0}")]
    LaunchUnavailable(String),

    /// The resolved command could not be spawned
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    /// Operation needs a live worker but none is running
    #[error("Worker is not running; call reset() first")]
    NotRunning,

    /// Writing a command to the worker failed
    #[error("Write to worker failed: {0}")]
    WriteFailed(String),

    /// No response line arrived before the deadline
    #[error("Timeout waiting for worker response after {waited:?}.\nStderr tail:\n{stderr_tail}")]
    Timeout {
        waited: Duration,
        stderr_tail: String,
    },

    /// Response line is not valid protocol JSON
    #[error("Invalid JSON from worker: {line}\nStderr tail:\n{stderr_tail}")]
    ProtocolError { line: String, stderr_tail: String },

    /// Action outside the declared action space
    #[error("Action out of range: {action} (action space has {action_dim} actions)")]
    InvalidAction { action: i64, action_dim: usize },

    /// Snapshot reply did not carry a snapshot mapping
    #[error("Snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl BridgeError {
    /// Whether the worker must be considered dead after this error
    pub fn is_worker_lost(&self) -> bool {
        matches!(self, BridgeError::WriteFailed(_) | BridgeError::NotRunning)
    }

    /// Attach the worker's recent stderr output to timeout and protocol errors
    pub fn with_stderr_tail(self, tail: String) -> Self {
        match self {
            BridgeError::Timeout { waited, .. } => BridgeError::Timeout {
                waited,
                stderr_tail: tail,
            },
            BridgeError::ProtocolError { line, .. } => BridgeError::ProtocolError {
                line,
                stderr_tail: tail,
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_carries_stderr_tail() {
        let err = BridgeError::Timeout {
            waited: Duration::from_secs(3),
            stderr_tail: "loading deck\nstuck".into(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Timeout waiting for worker response"));
        assert!(msg.contains("Stderr tail:\nloading deck\nstuck"));
    }

    #[test]
    fn test_protocol_error_carries_raw_line() {
        let err = BridgeError::ProtocolError {
            line: "{oops".into(),
            stderr_tail: String::new(),
        };
        assert!(err.to_string().contains("{oops"));
        assert!(!err.is_worker_lost());
        assert!(BridgeError::WriteFailed("broken pipe".into()).is_worker_lost());

        let err = err.with_stderr_tail("TypeError: x is undefined".into());
        assert!(err.to_string().ends_with("Stderr tail:\nTypeError: x is undefined"));
    }
}
