//! Tracker error types

use batchtrack_core::domain::pipeline::PipelineError;
use batchtrack_core::domain::spec::StageStepError;
use batchtrack_core::meta::MetaParseError;
use batchtrack_scheduler::CredentialError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors surfaced by the tracker
///
/// Scheduler outages during status queries are absent on purpose: the
/// reconciler recovers from them with fallback statuses.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Malformed job specification; nothing was submitted
    #[error("invalid job specification: {0}")]
    InvalidSpec(String),

    /// The scheduler refused the job; carries its raw error text
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// A record already exists for this job id
    #[error("a record already exists for job {0}")]
    DuplicateKey(String),

    /// No record exists for this job id
    #[error("job {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// A record file exists but cannot be decoded
    #[error("corrupt record {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: MetaParseError,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl TrackerError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Failures caused by the operator's request rather than the host,
    /// reported as a plain message without an error chain
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::InvalidSpec(_) | Self::SubmissionFailed(_) | Self::NotFound(_) | Self::Credentials(_)
        )
    }
}

impl From<StageStepError> for TrackerError {
    fn from(err: StageStepError) -> Self {
        TrackerError::InvalidSpec(err.to_string())
    }
}

impl From<PipelineError> for TrackerError {
    fn from(err: PipelineError) -> Self {
        TrackerError::InvalidSpec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_visible_errors() {
        assert!(TrackerError::InvalidSpec("x".into()).is_user_visible());
        assert!(TrackerError::SubmissionFailed("x".into()).is_user_visible());
        assert!(TrackerError::NotFound("1".into()).is_user_visible());
        assert!(!TrackerError::DuplicateKey("1".into()).is_user_visible());

        let io = TrackerError::io("read", std::io::Error::other("boom"));
        assert!(!io.is_user_visible());
        assert_eq!(io.to_string(), "read: boom");
    }

    #[test]
    fn test_stage_step_error_is_invalid_spec() {
        let err: TrackerError = batchtrack_core::domain::spec::StageStep::parse("nope")
            .unwrap_err()
            .into();
        assert!(matches!(err, TrackerError::InvalidSpec(_)));
    }

    #[test]
    fn test_pipeline_error_is_invalid_spec() {
        let err: TrackerError = PipelineError::Cycle(vec!["a@1".into(), "b@1".into()]).into();
        assert!(err.is_user_visible());
        assert_eq!(
            err.to_string(),
            "invalid job specification: dependency cycle between a@1, b@1"
        );
    }
}
