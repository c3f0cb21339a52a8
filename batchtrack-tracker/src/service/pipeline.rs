//! Pipeline Service
//!
//! Submits a set of jobs declared in a parameters file, in dependency
//! order, through the [`SubmissionService`]. Each job waits on the real
//! scheduler ids of its upstream jobs with an `afterok` dependency.
//!
//! Parameters file layout:
//!
//! ```yaml
//! stages:
//!   preprocess:
//!     shard0:
//!       resources: { gpus: 0, time_limit: "00:20:00" }
//!   training:
//!     base:
//!       gpus: 2
//!       time_limit: "04:00:00"
//!       after: [preprocess@shard0]
//! ```
//!
//! Resources may sit under `resources` or directly on the step; when a
//! `resources` section exists the inline values are ignored. Any other
//! keys are left alone.

use batchtrack_core::domain::job::JobRecord;
use batchtrack_core::domain::pipeline::{Pipeline, PipelineError, PipelineJob, PipelinePlan};
use batchtrack_core::domain::resources::{ResourceRequest, parse_time_limit};
use batchtrack_core::domain::spec::{Dependency, JobSpec, StageStep};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::{Result, TrackerError};
use crate::service::submission::SubmissionService;

/// Parameters file read when none is given
pub const DEFAULT_PARAMS_FILE: &str = "params.yaml";

#[derive(Debug, Deserialize)]
struct ParamsFile {
    #[serde(default)]
    stages: BTreeMap<String, BTreeMap<String, StepEntry>>,
}

#[derive(Debug, Deserialize)]
struct StepEntry {
    resources: Option<ResourceFields>,
    #[serde(flatten)]
    inline: ResourceFields,
    #[serde(default)]
    after: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceFields {
    gpus: Option<u32>,
    time_limit: Option<String>,
    memory: Option<String>,
    cpus: Option<u32>,
    partition: Option<String>,
    nodes: Option<u32>,
    ntasks: Option<u32>,
    ntasks_per_node: Option<u32>,
}

impl ResourceFields {
    fn into_request(self) -> ResourceRequest {
        let defaults = ResourceRequest::default();
        ResourceRequest {
            gpus: self.gpus.unwrap_or(defaults.gpus),
            time_limit: self.time_limit.unwrap_or(defaults.time_limit),
            memory: self.memory.unwrap_or(defaults.memory),
            cpus: self.cpus.unwrap_or(defaults.cpus),
            partition: self.partition.unwrap_or(defaults.partition),
            nodes: self.nodes.unwrap_or(defaults.nodes),
            ntasks: self.ntasks.unwrap_or(defaults.ntasks),
            ntasks_per_node: self.ntasks_per_node.unwrap_or(defaults.ntasks_per_node),
        }
    }
}

/// Reads and validates a parameters file
pub fn load_pipeline(path: &Path) -> Result<Pipeline> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| TrackerError::io(format!("failed to read {}", path.display()), e))?;
    let pipeline = parse_pipeline(&text)
        .map_err(|e| TrackerError::InvalidSpec(format!("{}: {}", path.display(), e)))?;

    info!(
        "Loaded {} pipeline job(s) from {}",
        pipeline.len(),
        path.display()
    );
    Ok(pipeline)
}

/// Parses parameters file content
pub fn parse_pipeline(text: &str) -> std::result::Result<Pipeline, PipelineParseError> {
    let params: ParamsFile = serde_yaml::from_str(text)?;

    let mut jobs = Vec::new();
    for (stage, steps) in params.stages {
        for (step, entry) in steps {
            let target = StageStep::parse(&format!("{}@{}", stage, step))
                .map_err(PipelineError::from)?;
            let resources = entry.resources.unwrap_or(entry.inline).into_request();
            if parse_time_limit(&resources.time_limit).is_none() {
                warn!(
                    "{} has unparseable time limit '{}', counting 1 hour",
                    target, resources.time_limit
                );
            }
            jobs.push(PipelineJob {
                target,
                resources,
                after: entry.after,
            });
        }
    }

    Ok(Pipeline::new(jobs)?)
}

/// Why a parameters file was rejected
#[derive(Debug, Error)]
pub enum PipelineParseError {
    #[error("not a valid parameters file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// The jobs `pattern` selects, plus everything they depend on
///
/// No pattern selects the whole pipeline. A pattern is tried, in order, as
/// an exact `stage@step` key, as a shell glob when it contains `*`, `?` or
/// `[`, as a regular expression when it contains other regex syntax, as a
/// stage name, and finally as a substring of the key.
pub fn select_jobs(pipeline: &Pipeline, pattern: Option<&str>) -> Result<BTreeSet<String>> {
    let Some(pattern) = pattern.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(pipeline.keys().cloned().collect());
    };

    let matched = match_jobs(pipeline, pattern)?;
    if matched.is_empty() {
        let stages: BTreeSet<&str> = pipeline.jobs().map(|j| j.target.stage.as_str()).collect();
        return Err(TrackerError::InvalidSpec(format!(
            "'{}' matched no pipeline job; stages are: {}",
            pattern,
            stages.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    let selected = pipeline.with_dependencies(matched.iter().map(String::as_str));
    info!(
        "'{}' matched {} job(s), {} with dependencies",
        pattern,
        matched.len(),
        selected.len()
    );
    Ok(selected)
}

fn match_jobs(pipeline: &Pipeline, pattern: &str) -> Result<Vec<String>> {
    if pipeline.get(pattern).is_some() {
        return Ok(vec![pattern.to_string()]);
    }

    let regex = if pattern.contains(['*', '?', '[']) {
        glob_to_regex(pattern)
    } else if pattern.contains(['^', '$', '(', ')', '|', '+', '{', '}']) {
        pattern.to_string()
    } else {
        let by_stage: Vec<String> = pipeline
            .jobs()
            .filter(|j| j.target.stage == pattern)
            .map(PipelineJob::key)
            .collect();
        if !by_stage.is_empty() {
            return Ok(by_stage);
        }
        return Ok(pipeline
            .keys()
            .filter(|key| key.contains(pattern))
            .cloned()
            .collect());
    };

    let regex = Regex::new(&regex)
        .map_err(|e| TrackerError::InvalidSpec(format!("target pattern '{}': {}", pattern, e)))?;
    Ok(pipeline
        .keys()
        .filter(|key| regex.is_match(key))
        .cloned()
        .collect())
}

/// Anchored regex for a shell glob with `*`, `?` and `[...]` classes
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut in_class = false;

    for c in glob.chars() {
        match c {
            '[' if !in_class => {
                in_class = true;
                out.push('[');
            }
            '!' if in_class && out.ends_with('[') => out.push('^'),
            ']' if in_class => {
                in_class = false;
                out.push(']');
            }
            '\\' if in_class => out.push_str("\\\\"),
            c if in_class => out.push(c),
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    out.push('$');
    out
}

/// Outcome of submitting a pipeline
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Shared by every job of the run
    pub run_group_id: String,
    pub submitted: Vec<JobRecord>,
    /// Jobs the scheduler or the tracker refused, with the reason
    pub failed: Vec<(String, String)>,
    /// Jobs not attempted because an upstream job was not submitted
    pub skipped: Vec<String>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Submits pipeline plans
#[derive(Clone)]
pub struct PipelineService {
    submissions: SubmissionService,
}

impl PipelineService {
    pub fn new(submissions: SubmissionService) -> Self {
        Self { submissions }
    }

    /// Submits every job of `plan`, batch by batch
    ///
    /// A job that fails to submit does not stop the run; jobs depending on
    /// it, directly or not, are skipped. Dependencies outside the plan are
    /// not waited on.
    pub async fn run(
        &self,
        plan: &PipelinePlan,
        run_group: Option<&str>,
        env: &BTreeMap<String, String>,
    ) -> PipelineReport {
        let mut report = PipelineReport {
            run_group_id: self.submissions.run_group_id(run_group),
            ..PipelineReport::default()
        };
        let mut job_ids: HashMap<String, String> = HashMap::new();
        let mut blocked: HashSet<String> = HashSet::new();

        for (index, batch) in plan.batches.iter().enumerate() {
            info!(
                "Submitting batch {} of {} ({} job(s))",
                index + 1,
                plan.batches.len(),
                batch.jobs.len()
            );

            for job in &batch.jobs {
                let key = job.key();

                if let Some(upstream) = job.after.iter().find(|dep| blocked.contains(*dep)) {
                    warn!("Skipping {}: {} was not submitted", key, upstream);
                    blocked.insert(key.clone());
                    report.skipped.push(key);
                    continue;
                }

                let upstream_ids: Vec<String> = job
                    .after
                    .iter()
                    .filter_map(|dep| job_ids.get(dep).cloned())
                    .collect();
                let spec = JobSpec {
                    target: key.clone(),
                    resources: job.resources.clone(),
                    dependency: (!upstream_ids.is_empty()).then(|| Dependency::AfterOk(upstream_ids)),
                    run_group: Some(report.run_group_id.clone()),
                    job_name: None,
                    env: env.clone(),
                };

                match self.submissions.submit(&spec).await {
                    Ok(record) => {
                        job_ids.insert(key, record.job_id.clone());
                        report.submitted.push(record);
                    }
                    Err(e) => {
                        warn!("Failed to submit {}: {}", key, e);
                        blocked.insert(key.clone());
                        report.failed.push((key, e.to_string()));
                    }
                }
            }
        }

        info!(
            "Pipeline run {}: {} submitted, {} failed, {} skipped",
            report.run_group_id,
            report.submitted.len(),
            report.failed.len(),
            report.skipped.len()
        );
        report
    }
}
