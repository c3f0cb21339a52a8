//! Job DTOs for presentation

use serde::Serialize;

use crate::domain::job::JobRecord;
use crate::domain::status::JobStatus;

/// A stored record paired with its status as resolved right now
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub record: JobRecord,
    pub status: JobStatus,
}

/// Tracked job counts per status bucket
///
/// `pending` also counts jobs still in the `SUBMITTED` snapshot state, so
/// `running + pending` is exactly the set [`JobStatus::is_active`] selects.
/// `failed` covers every unsuccessful terminal outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub running: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub unknown: usize,
    /// Requested GPU hours across pending and running jobs
    pub active_gpu_hours: f64,
    /// Requested CPU hours across pending and running jobs
    pub active_cpu_hours: f64,
}

impl StatusSummary {
    /// Count one job into its bucket
    pub fn record(&mut self, status: JobStatus) {
        self.total += 1;
        match status {
            JobStatus::Running => self.running += 1,
            JobStatus::Submitted | JobStatus::Pending => self.pending += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout => self.failed += 1,
            JobStatus::Unknown => self.unknown += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::fixtures::record;

    #[test]
    fn test_summary_buckets() {
        let mut summary = StatusSummary::default();
        for status in [
            JobStatus::Submitted,
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Timeout,
            JobStatus::Unknown,
        ] {
            summary.record(status);
        }

        assert_eq!(summary.total, 8);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.running, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.unknown, 1);
    }

    #[test]
    fn test_pending_and_running_buckets_are_the_active_statuses() {
        for status in [
            JobStatus::Submitted,
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Timeout,
            JobStatus::Unknown,
        ] {
            let mut summary = StatusSummary::default();
            summary.record(status);
            assert_eq!(
                summary.running + summary.pending == 1,
                status.is_active(),
                "{status} is bucketed inconsistently"
            );
        }
    }

    #[test]
    fn test_view_serializes_flat() {
        let view = JobView {
            record: record("555", "combined_inference", "stepA"),
            status: JobStatus::Running,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["job_id"], "555");
        assert_eq!(json["status"], "RUNNING");
        assert_eq!(json["gpus"], 2);
    }
}
