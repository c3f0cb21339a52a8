//! Job specifications
//!
//! The operator-facing description of a job before it reaches the
//! scheduler: which `stage@step` to run, with what resources, after which
//! upstream jobs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::resources::ResourceRequest;

/// Rejected `stage@step` identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid stage identifier '{input}': {reason}")]
pub struct StageStepError {
    pub input: String,
    pub reason: &'static str,
}

/// A validated `stage@step` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageStep {
    pub stage: String,
    pub step: String,
}

impl StageStep {
    /// Parse `stage@step`: exactly two non-empty segments around one `@`
    ///
    /// Both segments name directories and files on disk, so path
    /// separators and dot-leading names are refused.
    pub fn parse(input: &str) -> Result<Self, StageStepError> {
        let reject = |reason| StageStepError {
            input: input.to_string(),
            reason,
        };

        let (stage, step) = input
            .split_once('@')
            .ok_or_else(|| reject("expected the form stage@step"))?;

        if stage.is_empty() || step.is_empty() {
            return Err(reject("stage and step must both be non-empty"));
        }
        if step.contains('@') {
            return Err(reject("only one '@' separator is allowed"));
        }
        if input.chars().any(char::is_whitespace) {
            return Err(reject("whitespace is not allowed"));
        }
        if let Some(reason) = [stage, step].into_iter().find_map(path_segment_problem) {
            return Err(reject(reason));
        }

        Ok(Self {
            stage: stage.to_string(),
            step: step.to_string(),
        })
    }
}

/// Why `segment` cannot be used as a single file or directory name
///
/// Checks separators and dot-leading names only; callers decide about
/// emptiness and whitespace.
pub fn path_segment_problem(segment: &str) -> Option<&'static str> {
    if segment.contains(['/', '\\']) {
        Some("path separators are not allowed")
    } else if segment.contains("..") {
        Some("'..' is not allowed")
    } else if segment.starts_with('.') {
        Some("names must not start with '.'")
    } else {
        None
    }
}

impl std::fmt::Display for StageStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.stage, self.step)
    }
}

/// Ordering constraint on upstream jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dependency {
    /// Start only after every listed job completed successfully
    AfterOk(Vec<String>),
    /// A scheduler dependency expression passed through untouched
    Expression(String),
}

impl Dependency {
    /// Build from operator input: `afterok:1:2` style expressions pass
    /// through, anything else is read as a comma separated list of job ids.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() || input.eq_ignore_ascii_case("none") {
            return None;
        }
        if input.contains(':') {
            return Some(Dependency::Expression(input.to_string()));
        }

        let ids: Vec<String> = input
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        (!ids.is_empty()).then_some(Dependency::AfterOk(ids))
    }

    /// Render in scheduler syntax
    pub fn render(&self) -> String {
        match self {
            Dependency::AfterOk(ids) => format!("afterok:{}", ids.join(":")),
            Dependency::Expression(expr) => expr.clone(),
        }
    }
}

/// Everything needed to submit one job
#[derive(Clone, Default)]
pub struct JobSpec {
    /// Raw `stage@step` identifier, validated at submission
    pub target: String,
    pub resources: ResourceRequest,
    pub dependency: Option<Dependency>,
    /// Operator supplied run group; generated when absent
    pub run_group: Option<String>,
    /// Custom job name, also used as the log file prefix
    pub job_name: Option<String>,
    /// Credential variables forwarded to the job environment
    pub env: BTreeMap<String, String>,
}

impl std::fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSpec")
            .field("target", &self.target)
            .field("resources", &self.resources)
            .field("dependency", &self.dependency)
            .field("run_group", &self.run_group)
            .field("job_name", &self.job_name)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .finish()
    }
}
