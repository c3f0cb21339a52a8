//! SLURM scheduler
//!
//! Talks to SLURM through its command line tools:
//! - `sbatch` submits the job script with the requested resources
//! - `squeue` answers the status of many jobs in one call

use async_trait::async_trait;
use batchtrack_core::dto::submit::SubmitRequest;
use regex::Regex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, info};

use crate::Scheduler;
use crate::error::{Result, SchedulerError};

static SUBMITTED_JOB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Submitted batch job (\d+)").expect("valid regex"));

static PARSABLE_JOB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(;\S+)?$").expect("valid regex"));

/// SLURM tool locations and the batch script every job runs
#[derive(Debug, Clone)]
pub struct SlurmConfig {
    /// `sbatch` executable
    pub sbatch: PathBuf,
    /// `squeue` executable
    pub squeue: PathBuf,
    /// Batch script submitted for every job; receives `stage@step` and the
    /// run group id as its two arguments
    pub job_script: PathBuf,
}

impl SlurmConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - BATCHTRACK_SBATCH (default: sbatch)
    /// - BATCHTRACK_SQUEUE (default: squeue)
    /// - BATCHTRACK_JOB_SCRIPT (default: cluster/job.sbatch)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let path = |key: &str, fallback: PathBuf| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(fallback)
        };

        Self {
            sbatch: path("BATCHTRACK_SBATCH", defaults.sbatch),
            squeue: path("BATCHTRACK_SQUEUE", defaults.squeue),
            job_script: path("BATCHTRACK_JOB_SCRIPT", defaults.job_script),
        }
    }
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            sbatch: PathBuf::from("sbatch"),
            squeue: PathBuf::from("squeue"),
            job_script: PathBuf::from("cluster/job.sbatch"),
        }
    }
}

/// [`Scheduler`] backed by the SLURM command line tools
#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    config: SlurmConfig,
}

impl SlurmScheduler {
    pub fn new(config: SlurmConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to `sbatch` for a request
    pub fn submit_args(&self, request: &SubmitRequest) -> Vec<String> {
        let res = &request.resources;
        let mut args = vec![
            format!("--job-name={}", request.job_name),
            format!("--output={}", request.output_pattern.display()),
            format!("--partition={}", res.partition),
            format!("--nodes={}", res.nodes),
            format!("--ntasks={}", res.ntasks),
            format!("--ntasks-per-node={}", res.ntasks_per_node),
            format!("--cpus-per-task={}", res.cpus),
            format!("--mem={}", res.memory),
            format!("--time={}", res.time_limit),
        ];

        if res.gpus > 0 {
            args.push(format!("--gres=gpu:{}", res.gpus));
        }
        if let Some(dependency) = &request.dependency {
            args.push(format!("--dependency={}", dependency));
        }

        args.push("--export=ALL".to_string());
        args.push(self.config.job_script.display().to_string());
        args.push(request.target.clone());
        args.push(request.run_group_id.clone());
        args
    }

    /// The full `sbatch` invocation, for dry runs and diagnostics
    pub fn command_line(&self, request: &SubmitRequest) -> Vec<String> {
        let mut line = vec![self.config.sbatch.display().to_string()];
        line.extend(self.submit_args(request));
        line
    }

    async fn run(&self, command: &mut Command, program: &str) -> Result<Output> {
        command
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    SchedulerError::Unavailable(format!("{} not found in PATH", program))
                }
                _ => SchedulerError::Unavailable(format!("failed to run {}: {}", program, e)),
            })
    }
}

#[async_trait]
impl Scheduler for SlurmScheduler {
    async fn submit(&self, request: &SubmitRequest) -> Result<String> {
        info!("Submitting {} as {}", request.target, request.job_name);
        debug!("sbatch arguments: {:?}", self.submit_args(request));
        if !request.env.is_empty() {
            debug!("Forwarding {} credential variable(s)", request.env.len());
        }

        let mut command = Command::new(&self.config.sbatch);
        command
            .args(self.submit_args(request))
            .env("RUN_GROUP_ID", &request.run_group_id)
            .env("PIPELINE_STAGE", &request.target)
            .envs(&request.env);

        let output = self.run(&mut command, "sbatch").await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(SchedulerError::CommandFailed {
                code: output.status.code(),
                stderr: detail,
            });
        }

        parse_submitted_job_id(&stdout).ok_or_else(|| {
            SchedulerError::Parse(format!(
                "no job id in sbatch output '{}'",
                stdout.trim()
            ))
        })
    }

    async fn batch_status(&self, job_ids: &[String]) -> Result<HashMap<String, String>> {
        if job_ids.is_empty() {
            return Ok(HashMap::new());
        }

        debug!("Querying squeue for {} job(s)", job_ids.len());

        let mut command = Command::new(&self.config.squeue);
        command
            .arg("--noheader")
            .arg("--format=%i|%T")
            .arg(format!("--jobs={}", job_ids.join(",")));

        let output = self.run(&mut command, "squeue").await?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            // squeue exits non-zero when none of the ids is still queued
            if stderr.to_ascii_lowercase().contains("invalid job id") {
                debug!("No queried job is still known to squeue");
                return Ok(HashMap::new());
            }
            return Err(SchedulerError::CommandFailed {
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(parse_queue_states(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Extract the job id from `sbatch` output
///
/// Understands both the default `Submitted batch job <id>` line and the
/// `--parsable` form `<id>[;cluster]`.
pub fn parse_submitted_job_id(stdout: &str) -> Option<String> {
    if let Some(caps) = SUBMITTED_JOB.captures(stdout) {
        return Some(caps[1].to_string());
    }

    stdout
        .lines()
        .map(str::trim)
        .find_map(|line| PARSABLE_JOB.captures(line).map(|caps| caps[1].to_string()))
}

/// Parse `squeue --format=%i|%T` output into job id → raw state
pub fn parse_queue_states(stdout: &str) -> HashMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| {
            let (id, state) = line.trim().split_once('|')?;
            let (id, state) = (id.trim(), state.trim());
            (!id.is_empty() && !state.is_empty()).then(|| (id.to_string(), state.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchtrack_core::domain::resources::ResourceRequest;
    use std::collections::BTreeMap;

    fn request() -> SubmitRequest {
        SubmitRequest {
            job_name: "combined_inference_stepA".to_string(),
            target: "combined_inference@stepA".to_string(),
            run_group_id: "20261018.0930.a1b2c3".to_string(),
            resources: ResourceRequest {
                gpus: 2,
                time_limit: "01:00:00".to_string(),
                ..ResourceRequest::default()
            },
            dependency: Some("afterok:554".to_string()),
            output_pattern: PathBuf::from("/logs/combined_inference/combined_inference_stepA_%j.out"),
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn test_parse_submitted_job_id() {
        assert_eq!(
            parse_submitted_job_id("Submitted batch job 555\n"),
            Some("555".to_string())
        );
        assert_eq!(
            parse_submitted_job_id("sbatch: warning: x\nSubmitted batch job 9 on cluster c\n"),
            Some("9".to_string())
        );
        assert_eq!(parse_submitted_job_id("1234;gpu\n"), Some("1234".to_string()));
        assert_eq!(parse_submitted_job_id("sbatch: error: denied"), None);
        assert_eq!(parse_submitted_job_id(""), None);
    }

    #[test]
    fn test_parse_queue_states() {
        let states = parse_queue_states("101|RUNNING\n 102|PENDING \n\nbroken\n103|\n");
        assert_eq!(states.len(), 2);
        assert_eq!(states["101"], "RUNNING");
        assert_eq!(states["102"], "PENDING");
    }

    #[test]
    fn test_submit_args() {
        let scheduler = SlurmScheduler::new(SlurmConfig::default());
        let args = scheduler.submit_args(&request());

        assert!(args.contains(&"--gres=gpu:2".to_string()));
        assert!(args.contains(&"--time=01:00:00".to_string()));
        assert!(args.contains(&"--dependency=afterok:554".to_string()));
        assert_eq!(
            args[args.len() - 3..],
            [
                "cluster/job.sbatch".to_string(),
                "combined_inference@stepA".to_string(),
                "20261018.0930.a1b2c3".to_string(),
            ]
        );
    }

    #[test]
    fn test_submit_args_without_gpus() {
        let scheduler = SlurmScheduler::new(SlurmConfig::default());
        let mut req = request();
        req.resources.gpus = 0;
        req.dependency = None;

        let args = scheduler.submit_args(&req);
        assert!(!args.iter().any(|a| a.starts_with("--gres")));
        assert!(!args.iter().any(|a| a.starts_with("--dependency")));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let scheduler = SlurmScheduler::new(SlurmConfig {
            squeue: PathBuf::from("/nonexistent/batchtrack-squeue"),
            ..SlurmConfig::default()
        });

        let err = scheduler
            .batch_status(&["1".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn test_empty_query_skips_scheduler() {
        let scheduler = SlurmScheduler::new(SlurmConfig {
            squeue: PathBuf::from("/nonexistent/batchtrack-squeue"),
            ..SlurmConfig::default()
        });

        assert!(scheduler.batch_status(&[]).await.unwrap().is_empty());
    }
}
