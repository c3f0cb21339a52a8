//! Job record domain type

use serde::{Deserialize, Serialize};

use crate::domain::status::JobStatus;

/// Marker stored when a job has no dependency
pub const NO_DEPENDENCY: &str = "none";

/// Metadata persisted for one submitted job
///
/// Written once, right after the scheduler accepted the submission, and
/// never rewritten. `last_known_status` is the snapshot taken at that
/// moment; the live status is always resolved against the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub stage_name: String,
    pub step_name: String,
    pub submit_time: String,
    pub submit_timestamp: i64,
    pub log_file_path: String,
    pub last_known_status: String,
    pub user: String,

    pub partition: String,
    pub nodes: Option<u32>,
    pub cpus: Option<u32>,
    pub memory: String,
    pub gpus: Option<u32>,
    pub time_limit: String,
    pub dependency: String,

    pub git_commit: String,
    pub hostname: String,
    pub working_dir: String,
    pub run_group_id: String,
}

impl JobRecord {
    /// The `stage@step` identifier this job was submitted under
    pub fn stage(&self) -> String {
        format!("{}@{}", self.stage_name, self.step_name)
    }

    /// The stored snapshot, if it is a recognizable status
    pub fn stored_status(&self) -> Option<JobStatus> {
        JobStatus::normalize(&self.last_known_status)
    }

    pub fn has_dependency(&self) -> bool {
        !self.dependency.is_empty() && self.dependency != NO_DEPENDENCY
    }

    /// Every stored value with its `.meta` key, in file order
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let number = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_default();

        vec![
            ("JOB_ID", self.job_id.clone()),
            ("STAGE", self.stage()),
            ("STAGE_NAME", self.stage_name.clone()),
            ("STEP_NAME", self.step_name.clone()),
            ("SUBMIT_TIME", self.submit_time.clone()),
            ("SUBMIT_TIMESTAMP", self.submit_timestamp.to_string()),
            ("LOG_FILE", self.log_file_path.clone()),
            ("STATUS", self.last_known_status.clone()),
            ("USER", self.user.clone()),
            ("PARTITION", self.partition.clone()),
            ("NODES", number(self.nodes)),
            ("CPUS", number(self.cpus)),
            ("MEMORY", self.memory.clone()),
            ("GPUS", number(self.gpus)),
            ("TIME_LIMIT", self.time_limit.clone()),
            ("GIT_COMMIT", self.git_commit.clone()),
            ("DEPENDENCY", self.dependency.clone()),
            ("HOSTNAME", self.hostname.clone()),
            ("WORKING_DIR", self.working_dir.clone()),
            ("RUN_GROUP_ID", self.run_group_id.clone()),
        ]
    }
}
