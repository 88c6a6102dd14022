//! Errors from the Excel COM bridge client

use std::path::PathBuf;

/// Errors from starting or talking to the bridge process
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No bridge executable, or no launcher to run it with
    #[error("Excel automation unavailable: {0}")]
    NotFound(String),

    #[error("Failed to spawn bridge process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Bridge process is not running")]
    NotRunning,

    #[error("Failed to send command to bridge: {0}")]
    Send(#[source] std::io::Error),

    #[error("Failed to read response from bridge: {0}")]
    Read(#[source] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The bridge (or Excel behind it) reported a failure
    #[error("Bridge returned error: {0}")]
    Remote(String),

    #[error("Unexpected response to {0}")]
    UnexpectedResponse(&'static str),

    #[error("Response id {got} does not match request id {expected}")]
    IdMismatch { expected: u64, got: u64 },

    #[error("Cannot express {0} as a bridge path")]
    InvalidPath(PathBuf),

    #[error("Bridge connection poisoned by an earlier panic")]
    Poisoned,
}

impl BridgeError {
    /// Whether the error means automation is not installed at all, as
    /// opposed to a failure while using it
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BridgeError::NotFound(_))
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
