//! Error types shared across Steward crates.

use thiserror::Error;

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, StewardError>;

#[derive(Debug, Error)]
pub enum StewardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Not connected to gateway")]
    NotConnected,

    #[error("Gateway call '{action}' timed out after {timeout_ms}ms")]
    Timeout { action: String, timeout_ms: u64 },

    #[error("Gateway connection closed before '{0}' was answered")]
    ConnectionClosed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Task '{task}' failed after {attempts} attempts: {reason}")]
    JobFailed {
        task: String,
        attempts: u32,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StewardError {
    /// Whether the error is an operator-facing "not found" rather than a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StewardError::NotFound(_))
    }
}
