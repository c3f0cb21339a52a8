//! Error types for scheduler and credential access

use thiserror::Error;

/// Result type alias for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors that can occur when talking to the external scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler command could not be started at all
    #[error("scheduler unavailable: {0}")]
    Unavailable(String),

    /// The scheduler did not answer within the allowed time
    #[error("scheduler did not respond within {0:?}")]
    Timeout(std::time::Duration),

    /// The scheduler ran and rejected the request
    #[error("scheduler command failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        /// Process exit code, if the process exited normally
        code: Option<i32>,
        /// Raw scheduler error text
        stderr: String,
    },

    /// The scheduler answered with output we could not interpret
    #[error("unexpected scheduler output: {0}")]
    Parse(String),
}

impl SchedulerError {
    /// Whether the failure means the scheduler could not be consulted, as
    /// opposed to the scheduler answering with a refusal
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    /// Raw text suitable for showing to the operator
    pub fn raw_text(&self) -> String {
        match self {
            Self::CommandFailed { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors raised while loading job credentials
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// A required credential is not available
    #[error("required credential {0} is not set")]
    Missing(&'static str),
}
