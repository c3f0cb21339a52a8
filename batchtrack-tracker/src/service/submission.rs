//! Submission Service
//!
//! Turns a [`JobSpec`] into exactly one scheduler submission and, once the
//! scheduler accepted it, the job's record. A rejected submission leaves
//! no record behind.

use batchtrack_core::domain::job::{JobRecord, NO_DEPENDENCY};
use batchtrack_core::domain::spec::{JobSpec, StageStep, path_segment_problem};
use batchtrack_core::domain::status::JobStatus;
use batchtrack_core::dto::submit::{JOB_ID_PLACEHOLDER, SubmitRequest};
use batchtrack_scheduler::Scheduler;
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::repository::RecordStore;

/// A validated submission that has not reached the scheduler yet
#[derive(Debug, Clone)]
pub struct PreparedSubmission {
    pub stage: StageStep,
    pub request: SubmitRequest,
}

/// Submits jobs and records them
#[derive(Clone)]
pub struct SubmissionService {
    config: Arc<TrackerConfig>,
    scheduler: Arc<dyn Scheduler>,
    store: Arc<dyn RecordStore>,
}

impl SubmissionService {
    pub fn new(
        config: Arc<TrackerConfig>,
        scheduler: Arc<dyn Scheduler>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            config,
            scheduler,
            store,
        }
    }

    /// Validates a spec and resolves names, paths and the run group
    ///
    /// Has no side effects, so it also backs dry runs.
    pub fn prepare(&self, spec: &JobSpec) -> Result<PreparedSubmission> {
        let stage = StageStep::parse(&spec.target)?;

        let job_name = match &spec.job_name {
            Some(name) => name.trim().to_string(),
            None => format!("{}_{}", stage.stage, stage.step),
        };
        validate_job_name(&job_name)?;

        let run_group_id = self.run_group_id(spec.run_group.as_deref());

        let output_pattern = self
            .config
            .absolute_log_dir()
            .join(&stage.stage)
            .join(format!("{}_{}.out", job_name, JOB_ID_PLACEHOLDER));

        let request = SubmitRequest {
            job_name,
            target: stage.to_string(),
            run_group_id,
            resources: spec.resources.clone(),
            dependency: spec.dependency.as_ref().map(|d| d.render()),
            output_pattern,
            env: spec.env.clone(),
        };

        Ok(PreparedSubmission { stage, request })
    }

    /// Run group for `requested`, or a fresh one stamped with the commit
    pub fn run_group_id(&self, requested: Option<&str>) -> String {
        generate_run_group_id(requested, &self.config.provenance.git_commit, Local::now())
    }

    /// Submits a job and writes its record
    ///
    /// The scheduler is called exactly once. The record is written only
    /// after the scheduler returned a job id.
    pub async fn submit(&self, spec: &JobSpec) -> Result<JobRecord> {
        let PreparedSubmission { stage, request } = self.prepare(spec)?;

        if let Some(log_dir) = request.output_pattern.parent() {
            tokio::fs::create_dir_all(log_dir).await.map_err(|e| {
                TrackerError::io(format!("failed to create {}", log_dir.display()), e)
            })?;
        }

        let job_id = self
            .scheduler
            .submit(&request)
            .await
            .map_err(|e| TrackerError::SubmissionFailed(e.raw_text()))?;

        info!("Scheduler accepted {} as job {}", stage, job_id);

        let record = self.build_record(&job_id, &stage, &request, Local::now());
        if let Err(e) = self.store.put(&record) {
            warn!("Job {} was submitted but its record was not stored", job_id);
            return Err(e);
        }

        Ok(record)
    }

    fn build_record(
        &self,
        job_id: &str,
        stage: &StageStep,
        request: &SubmitRequest,
        now: DateTime<Local>,
    ) -> JobRecord {
        let provenance = &self.config.provenance;
        let res = &request.resources;

        JobRecord {
            job_id: job_id.to_string(),
            stage_name: stage.stage.clone(),
            step_name: stage.step.clone(),
            submit_time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            submit_timestamp: now.timestamp(),
            log_file_path: request.output_path_for(job_id).display().to_string(),
            last_known_status: JobStatus::Submitted.to_string(),
            user: provenance.user.clone(),
            partition: res.partition.clone(),
            nodes: Some(res.nodes),
            cpus: Some(res.cpus),
            memory: res.memory.clone(),
            gpus: Some(res.gpus),
            time_limit: res.time_limit.clone(),
            dependency: request
                .dependency
                .clone()
                .unwrap_or_else(|| NO_DEPENDENCY.to_string()),
            git_commit: provenance.git_commit.clone(),
            hostname: provenance.hostname.clone(),
            working_dir: provenance.working_dir.display().to_string(),
            run_group_id: request.run_group_id.clone(),
        }
    }
}

/// A job name doubles as the log file prefix, so it must be one plain
/// file name
fn validate_job_name(name: &str) -> Result<()> {
    let problem = if name.is_empty() {
        Some("must not be empty")
    } else if name.chars().any(char::is_whitespace) {
        Some("whitespace is not allowed")
    } else {
        path_segment_problem(name)
    };

    match problem {
        Some(reason) => Err(TrackerError::InvalidSpec(format!(
            "job name '{}': {}",
            name, reason
        ))),
        None => Ok(()),
    }
}

/// Run group for a submission
///
/// An operator supplied group is kept with every character outside
/// `[A-Za-z0-9_.-]` replaced by `_`. Otherwise one is generated as
/// `YYYYMMDD.HHMM.<commit>`.
pub fn generate_run_group_id(requested: Option<&str>, commit: &str, now: DateTime<Local>) -> String {
    if let Some(group) = requested.map(str::trim).filter(|g| !g.is_empty()) {
        return group
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
    }

    format!("{}.{}", now.format("%Y%m%d.%H%M"), commit)
}
