//! Status reconciler
//!
//! Combines stored records with the scheduler's live view. All records in
//! a request are resolved with one batched scheduler query, bounded by the
//! configured timeout. Stored records are never modified; the status is
//! computed for presentation only.

use batchtrack_core::domain::job::JobRecord;
use batchtrack_core::domain::status::JobStatus;
use batchtrack_core::dto::job::JobView;
use batchtrack_scheduler::Scheduler;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolves the current status of tracked jobs
#[derive(Clone)]
pub struct StatusReconciler {
    scheduler: Arc<dyn Scheduler>,
    timeout: Duration,
    enabled: bool,
}

impl StatusReconciler {
    /// # Arguments
    /// * `scheduler` - Source of live job states
    /// * `timeout` - Upper bound on the batched query
    /// * `enabled` - When false every status is `UNKNOWN` and the scheduler
    ///   is never consulted
    pub fn new(scheduler: Arc<dyn Scheduler>, timeout: Duration, enabled: bool) -> Self {
        Self {
            scheduler,
            timeout,
            enabled,
        }
    }

    /// Maps every record's job id to its current canonical status
    pub async fn resolve(&self, records: &[JobRecord]) -> HashMap<String, JobStatus> {
        if !self.enabled {
            return records
                .iter()
                .map(|r| (r.job_id.clone(), JobStatus::Unknown))
                .collect();
        }
        if records.is_empty() {
            return HashMap::new();
        }

        let ids: Vec<String> = records
            .iter()
            .map(|r| r.job_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let live = match tokio::time::timeout(self.timeout, self.scheduler.batch_status(&ids)).await
        {
            Ok(Ok(live)) => live,
            Ok(Err(e)) => {
                if e.is_unreachable() {
                    warn!("Scheduler unreachable, using stored statuses: {}", e);
                } else {
                    warn!("Scheduler status query failed, using stored statuses: {}", e);
                }
                return records
                    .iter()
                    .map(|r| (r.job_id.clone(), unreachable_status(r)))
                    .collect();
            }
            Err(_) => {
                warn!(
                    "Scheduler status query timed out after {:?}, using stored statuses",
                    self.timeout
                );
                return records
                    .iter()
                    .map(|r| (r.job_id.clone(), unreachable_status(r)))
                    .collect();
            }
        };

        debug!(
            "Scheduler reported {} of {} tracked job(s)",
            live.len(),
            ids.len()
        );

        records
            .iter()
            .map(|r| {
                let status = match live.get(&r.job_id) {
                    Some(raw) => queued_status(&r.job_id, raw),
                    None => departed_status(r),
                };
                (r.job_id.clone(), status)
            })
            .collect()
    }

    /// Pairs each record with its resolved status, preserving order
    pub async fn views(&self, records: Vec<JobRecord>) -> Vec<JobView> {
        let statuses = self.resolve(&records).await;
        records
            .into_iter()
            .map(|record| {
                let status = statuses
                    .get(&record.job_id)
                    .copied()
                    .unwrap_or(JobStatus::Unknown);
                JobView { record, status }
            })
            .collect()
    }
}

/// Status of a job the scheduler still lists
fn queued_status(job_id: &str, raw: &str) -> JobStatus {
    known(JobStatus::normalize(raw)).unwrap_or_else(|| {
        debug!("Unrecognized scheduler state '{}' for job {}", raw, job_id);
        JobStatus::Pending
    })
}

/// Status of a job the scheduler no longer lists
///
/// A stored terminal outcome stands; a stored waiting snapshot is stale
/// once the job has left the queue, so the job is taken as completed.
fn departed_status(record: &JobRecord) -> JobStatus {
    match record.stored_status() {
        Some(status) if status.is_terminal() => status,
        _ => JobStatus::Completed,
    }
}

/// Status when the scheduler could not be consulted
fn unreachable_status(record: &JobRecord) -> JobStatus {
    known(record.stored_status()).unwrap_or(JobStatus::Completed)
}

/// `UNKNOWN` is reserved for disabled status checks
fn known(status: Option<JobStatus>) -> Option<JobStatus> {
    status.filter(|s| *s != JobStatus::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockScheduler, record};

    fn reconciler(scheduler: Arc<MockScheduler>) -> StatusReconciler {
        StatusReconciler::new(scheduler, Duration::from_millis(200), true)
    }

    #[tokio::test]
    async fn test_live_statuses_are_normalized() {
        let scheduler = Arc::new(MockScheduler::with_states(&[("1", "R"), ("2", "PENDING")]));
        let statuses = reconciler(scheduler.clone())
            .resolve(&[record("1", "a", "b"), record("2", "a", "c")])
            .await;

        assert_eq!(statuses["1"], JobStatus::Running);
        assert_eq!(statuses["2"], JobStatus::Pending);
        assert_eq!(scheduler.status_calls(), 1);
    }

    #[tokio::test]
    async fn test_departed_job_defaults_to_completed() {
        let scheduler = Arc::new(MockScheduler::with_states(&[]));
        let mut stale = record("1", "a", "b");
        stale.last_known_status = String::new();
        let mut failed = record("2", "a", "c");
        failed.last_known_status = "FAILED".to_string();

        let statuses = reconciler(scheduler).resolve(&[stale, failed, record("3", "a", "d")]).await;
        assert_eq!(statuses["1"], JobStatus::Completed);
        assert_eq!(statuses["2"], JobStatus::Failed);
        assert_eq!(statuses["3"], JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_unavailable_scheduler_falls_back_to_stored() {
        let scheduler = Arc::new(MockScheduler::unavailable());
        let mut blank = record("2", "a", "c");
        blank.last_known_status = String::new();

        let statuses = reconciler(scheduler).resolve(&[record("1", "a", "b"), blank]).await;
        assert_eq!(statuses["1"], JobStatus::Submitted);
        assert_eq!(statuses["2"], JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_slow_scheduler_times_out_to_fallback() {
        let scheduler = Arc::new(
            MockScheduler::with_states(&[("1", "RUNNING")]).with_delay(Duration::from_secs(5)),
        );
        let started = std::time::Instant::now();

        let statuses = reconciler(scheduler).resolve(&[record("1", "a", "b")]).await;
        assert_eq!(statuses["1"], JobStatus::Submitted);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_disabled_checks_never_query() {
        let scheduler = Arc::new(MockScheduler::with_states(&[("1", "R")]));
        let statuses = StatusReconciler::new(scheduler.clone(), Duration::from_secs(1), false)
            .resolve(&[record("1", "a", "b")])
            .await;

        assert_eq!(statuses["1"], JobStatus::Unknown);
        assert_eq!(scheduler.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_unrecognized_live_state_is_pending() {
        let scheduler = Arc::new(MockScheduler::with_states(&[("1", "SPECIAL_EXIT")]));
        let statuses = reconciler(scheduler).resolve(&[record("1", "a", "b")]).await;
        assert_eq!(statuses["1"], JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_views_preserve_order() {
        let scheduler = Arc::new(MockScheduler::with_states(&[("2", "CD")]));
        let views = reconciler(scheduler)
            .views(vec![record("3", "a", "b"), record("2", "a", "c")])
            .await;

        assert_eq!(views[0].record.job_id, "3");
        assert_eq!(views[1].record.job_id, "2");
        assert_eq!(views[1].status, JobStatus::Completed);
    }
}
