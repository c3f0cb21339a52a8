//! Scheduler submission DTO

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::resources::ResourceRequest;

/// Placeholder the scheduler replaces with the assigned job id
pub const JOB_ID_PLACEHOLDER: &str = "%j";

/// One submission, fully resolved and ready for the scheduler
#[derive(Clone, Serialize)]
pub struct SubmitRequest {
    pub job_name: String,
    /// `stage@step` handed to the batch script
    pub target: String,
    pub run_group_id: String,
    pub resources: ResourceRequest,
    /// Dependency in scheduler syntax
    pub dependency: Option<String>,
    /// Output path pattern containing [`JOB_ID_PLACEHOLDER`]
    pub output_pattern: PathBuf,
    /// Extra environment for the job; values are never serialized
    #[serde(skip)]
    pub env: BTreeMap<String, String>,
}

impl SubmitRequest {
    /// Concrete log path once the scheduler assigned `job_id`
    pub fn output_path_for(&self, job_id: &str) -> PathBuf {
        PathBuf::from(
            self.output_pattern
                .to_string_lossy()
                .replace(JOB_ID_PLACEHOLDER, job_id),
        )
    }
}

impl std::fmt::Debug for SubmitRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitRequest")
            .field("job_name", &self.job_name)
            .field("target", &self.target)
            .field("run_group_id", &self.run_group_id)
            .field("resources", &self.resources)
            .field("dependency", &self.dependency)
            .field("output_pattern", &self.output_pattern)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_for() {
        let req = SubmitRequest {
            job_name: "eval_eval1".to_string(),
            target: "eval@eval1".to_string(),
            run_group_id: "rg".to_string(),
            resources: ResourceRequest::default(),
            dependency: None,
            output_pattern: PathBuf::from("/logs/eval/eval_eval1_%j.out"),
            env: BTreeMap::new(),
        };
        assert_eq!(
            req.output_path_for("901"),
            PathBuf::from("/logs/eval/eval_eval1_901.out")
        );
    }
}
