//! Error types for playrun
//!
//! Centralized error handling using thiserror. Recoverable failures are
//! `RunnerError` variants; conditions that must abort a job regardless of
//! where they happen are carried as a `FatalError`.

use thiserror::Error;

/// Unrecoverable job condition.
///
/// Raised when the runner itself is in a state that would corrupt the live
/// log stream if it continued. The orchestration layer checks for it with
/// [`RunnerError::is_fatal`] and stops the job.
#[derive(Debug, Error)]
pub enum FatalError {
    /// A log event could not be turned into its transport form
    #[error("Failed to serialize log event for job {job_id}: {source}")]
    Serialization {
        job_id: u64,
        #[source]
        source: serde_json::Error,
    },
}

/// All error types that can occur while running a job
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Repository path could not be resolved
    #[error("Repository error: {0}")]
    Repository(String),

    /// Dependency provisioning command failed
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    /// Automation process failed to start or exited unsuccessfully
    #[error("Process error: {0}")]
    Process(String),

    /// Output stream could not be captured
    #[error("Capture error: {0}")]
    Capture(String),

    /// Log storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Job-aborting condition
    #[error("Fatal: {0}")]
    Fatal(#[from] FatalError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RunnerError {
    /// Whether this error must abort the job outright.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RunnerError::Fatal(_))
    }
}

/// Result type alias for playrun operations
pub type Result<T> = std::result::Result<T, RunnerError>;
