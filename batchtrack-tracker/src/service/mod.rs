//! Service layer
//!
//! Business logic built on the record store and the scheduler: submitting
//! jobs and pipelines, reconciling statuses, reporting, log access and
//! retention.

mod logs;
mod pipeline;
mod query;
mod reconciler;
mod retention;
mod submission;

pub use logs::{DEFAULT_TAIL_LINES, FollowSummary, LogContent, LogService};
pub use pipeline::{
    DEFAULT_PARAMS_FILE, PipelineParseError, PipelineReport, PipelineService, load_pipeline,
    parse_pipeline, select_jobs,
};
pub use query::{QueryService, StatusFilter};
pub use reconciler::StatusReconciler;
pub use retention::{RetentionService, SweepReport};
pub use submission::{PreparedSubmission, SubmissionService, generate_run_group_id};
