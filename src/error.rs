//! Error types for the Gemini bridge.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// The request was malformed or named an unregistered operation.
    /// Raised before any process is spawned.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The external binary could not be located or started.
    #[error("failed to start external process: {0}")]
    Spawn(#[from] std::io::Error),

    /// The process did not exit within the configured deadline and was killed.
    #[error("process timed out after {secs} seconds")]
    Timeout { secs: u64 },

    /// The process ran but exited non-zero (or was killed by a signal,
    /// in which case no exit code is available).
    #[error("process exited with status {status:?}")]
    External {
        status: Option<i32>,
        stderr: String,
    },
}

impl BridgeError {
    /// Stable classification string carried on error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Validation(_) => "validation",
            BridgeError::Spawn(_) => "spawn",
            BridgeError::Timeout { .. } => "timeout",
            BridgeError::External { .. } => "external",
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
