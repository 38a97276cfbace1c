use crate::process::ProcessId;
use thiserror::Error;

/// Error types for session and process operations
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(ProcessId),

    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("Signal delivery failed for process {pid}: {reason}")]
    SignalFailed { pid: ProcessId, reason: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ProcessError {
    /// Check if this error is a registry lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ProcessError::SessionNotFound(_) | ProcessError::ProcessNotFound(_)
        )
    }

    /// Check if this error was caused by the caller (stale id, bad pattern)
    /// rather than by the operating system
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ProcessError::SessionNotFound(_)
                | ProcessError::ProcessNotFound(_)
                | ProcessError::InvalidPattern { .. }
        )
    }
}
