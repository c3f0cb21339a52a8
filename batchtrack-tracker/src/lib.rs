//! Batchtrack Tracker
//!
//! Job metadata and status reconciliation for batch jobs submitted to an
//! external scheduler.
//!
//! Architecture:
//! - Configuration: immutable settings and provenance, built once
//! - Repository: one `.meta` record per job in the tracking directory
//! - Services: submission, pipeline submission, status reconciliation,
//!   queries, log access and retention, all built on the repository
//!
//! Records are written once, after the scheduler accepted a job, and never
//! rewritten. Statuses shown to the operator are resolved live with a
//! single batched scheduler query per request.

pub mod config;
pub mod error;
pub mod repository;
pub mod service;

use batchtrack_scheduler::Scheduler;
use std::sync::Arc;

pub use config::{Provenance, TrackerConfig};
pub use error::{Result, TrackerError};

use crate::repository::{FileRecordStore, RecordStore};
use crate::service::{
    LogService, PipelineService, QueryService, RetentionService, StatusReconciler,
    SubmissionService,
};

/// Every tracker service wired to one record store and one scheduler
#[derive(Clone)]
pub struct Tracker {
    pub submissions: SubmissionService,
    pub pipelines: PipelineService,
    pub queries: QueryService,
    pub logs: LogService,
    pub retention: RetentionService,
}

impl Tracker {
    /// Tracker backed by `.meta` files in `config.tracking_dir`
    pub fn new(config: TrackerConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        let store = Arc::new(FileRecordStore::new(config.tracking_dir.clone()));
        Self::with_store(config, scheduler, store)
    }

    pub fn with_store(
        config: TrackerConfig,
        scheduler: Arc<dyn Scheduler>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let config = Arc::new(config);
        let reconciler = StatusReconciler::new(
            scheduler.clone(),
            config.status_timeout,
            config.status_checks,
        );

        let submissions = SubmissionService::new(config.clone(), scheduler, store.clone());

        Self {
            pipelines: PipelineService::new(submissions.clone()),
            submissions,
            queries: QueryService::new(store.clone(), reconciler),
            logs: LogService::new(store.clone(), config.follow_poll_interval),
            retention: RetentionService::new(store),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use batchtrack_core::domain::job::{JobRecord, NO_DEPENDENCY};
    use batchtrack_core::dto::submit::SubmitRequest;
    use batchtrack_scheduler::{Scheduler, SchedulerError};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub fn record(job_id: &str, stage: &str, step: &str) -> JobRecord {
        JobRecord {
            job_id: job_id.to_string(),
            stage_name: stage.to_string(),
            step_name: step.to_string(),
            submit_time: "2026-10-18 09:30:00".to_string(),
            submit_timestamp: 1_792_316_200,
            log_file_path: format!("/scratch/logs/{stage}/{stage}_{step}_{job_id}.out"),
            last_known_status: "SUBMITTED".to_string(),
            user: "operator".to_string(),
            partition: "long".to_string(),
            nodes: Some(1),
            cpus: Some(8),
            memory: "48g".to_string(),
            gpus: Some(2),
            time_limit: "01:00:00".to_string(),
            dependency: NO_DEPENDENCY.to_string(),
            git_commit: "a1b2c3".to_string(),
            hostname: "login01".to_string(),
            working_dir: "/home/operator/project".to_string(),
            run_group_id: "20261018.0930.a1b2c3".to_string(),
        }
    }

    /// Scripted scheduler that counts the calls it receives
    pub struct MockScheduler {
        states: HashMap<String, String>,
        submit_outcome: Result<String, String>,
        /// When set, accepted jobs get consecutive ids from here
        next_id: Option<AtomicUsize>,
        reachable: bool,
        delay: Duration,
        submit_calls: AtomicUsize,
        status_calls: AtomicUsize,
        last_queried: Mutex<Vec<String>>,
    }

    impl MockScheduler {
        pub fn with_states(states: &[(&str, &str)]) -> Self {
            Self {
                states: states
                    .iter()
                    .map(|(id, state)| (id.to_string(), state.to_string()))
                    .collect(),
                submit_outcome: Ok("1".to_string()),
                next_id: None,
                reachable: true,
                delay: Duration::ZERO,
                submit_calls: AtomicUsize::new(0),
                status_calls: AtomicUsize::new(0),
                last_queried: Mutex::new(Vec::new()),
            }
        }

        pub fn accepting(job_id: &str) -> Self {
            Self {
                submit_outcome: Ok(job_id.to_string()),
                ..Self::with_states(&[])
            }
        }

        pub fn counting_from(first_id: usize) -> Self {
            Self {
                next_id: Some(AtomicUsize::new(first_id)),
                ..Self::with_states(&[])
            }
        }

        pub fn rejecting(stderr: &str) -> Self {
            Self {
                submit_outcome: Err(stderr.to_string()),
                ..Self::with_states(&[])
            }
        }

        pub fn unavailable() -> Self {
            Self {
                reachable: false,
                ..Self::with_states(&[])
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn submit_calls(&self) -> usize {
            self.submit_calls.load(Ordering::SeqCst)
        }

        pub fn status_calls(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }

        pub fn last_queried(&self) -> Vec<String> {
            self.last_queried.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Scheduler for MockScheduler {
        async fn submit(&self, _request: &SubmitRequest) -> batchtrack_scheduler::Result<String> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(next_id) = &self.next_id {
                return Ok(next_id.fetch_add(1, Ordering::SeqCst).to_string());
            }
            self.submit_outcome
                .clone()
                .map_err(|stderr| SchedulerError::CommandFailed {
                    code: Some(1),
                    stderr,
                })
        }

        async fn batch_status(
            &self,
            job_ids: &[String],
        ) -> batchtrack_scheduler::Result<HashMap<String, String>> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_queried.lock().unwrap() = job_ids.to_vec();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if !self.reachable {
                return Err(SchedulerError::Unavailable("squeue not found in PATH".to_string()));
            }
            Ok(job_ids
                .iter()
                .filter_map(|id| self.states.get(id).map(|s| (id.clone(), s.clone())))
                .collect())
        }
    }
}
