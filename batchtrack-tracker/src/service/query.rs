//! Query Service
//!
//! Read-side operations over the record store. Every result goes through
//! the [`StatusReconciler`] so statuses are current, and the reconciler is
//! only ever asked about the records a query actually returns.

use batchtrack_core::domain::job::JobRecord;
use batchtrack_core::domain::resources::parse_time_limit;
use batchtrack_core::domain::status::JobStatus;
use batchtrack_core::dto::job::{JobView, StatusSummary};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::warn;

use crate::error::{Result, TrackerError};
use crate::repository::RecordStore;
use crate::service::reconciler::StatusReconciler;

/// Convenience views over live statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Submitted, pending or running
    Active,
    /// Failed, cancelled or timed out
    Failed,
    Completed,
}

impl StatusFilter {
    pub fn matches(&self, status: JobStatus) -> bool {
        match self {
            StatusFilter::Active => status.is_active(),
            StatusFilter::Failed => status.is_failure(),
            StatusFilter::Completed => status == JobStatus::Completed,
        }
    }
}

/// List, search and report over tracked jobs
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn RecordStore>,
    reconciler: StatusReconciler,
}

impl QueryService {
    pub fn new(store: Arc<dyn RecordStore>, reconciler: StatusReconciler) -> Self {
        Self { store, reconciler }
    }

    /// Every readable record; unreadable ones are skipped with a warning
    fn load_all(&self) -> Result<Vec<JobRecord>> {
        let mut records = Vec::new();
        for item in self.store.scan()? {
            match item {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable record: {}", e),
            }
        }
        Ok(records)
    }

    /// Records newest first, truncated to `limit`
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<JobView>> {
        let mut records = self.load_all()?;
        sort_newest_first(&mut records);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(self.reconciler.views(records).await)
    }

    /// Records with any field matching `pattern`, newest first
    ///
    /// The pattern is a case-insensitive regular expression; one that does
    /// not compile is matched as a literal substring.
    pub async fn search(&self, pattern: &str) -> Result<Vec<JobView>> {
        let matcher = compile_pattern(pattern)?;
        let mut records: Vec<JobRecord> = self
            .load_all()?
            .into_iter()
            .filter(|record| {
                record
                    .fields()
                    .iter()
                    .any(|(_, value)| matcher.is_match(value))
            })
            .collect();
        sort_newest_first(&mut records);
        Ok(self.reconciler.views(records).await)
    }

    /// Records whose live status passes `filter`, newest first
    pub async fn filter(&self, filter: StatusFilter) -> Result<Vec<JobView>> {
        let mut records = self.load_all()?;
        sort_newest_first(&mut records);
        Ok(self
            .reconciler
            .views(records)
            .await
            .into_iter()
            .filter(|view| filter.matches(view.status))
            .collect())
    }

    /// One record with its live status
    pub async fn detail(&self, job_id: &str) -> Result<JobView> {
        let record = self.store.get(job_id)?;
        self.reconciler
            .views(vec![record])
            .await
            .pop()
            .ok_or_else(|| TrackerError::NotFound(job_id.to_string()))
    }

    /// Counts per status bucket plus requested hours of active jobs
    pub async fn summary(&self) -> Result<StatusSummary> {
        let views = self.reconciler.views(self.load_all()?).await;
        let mut summary = StatusSummary::default();

        for view in &views {
            summary.record(view.status);
            if !view.status.is_active() {
                continue;
            }
            let hours = requested_hours(&view.record);
            summary.active_gpu_hours += hours * f64::from(view.record.gpus.unwrap_or(0));
            summary.active_cpu_hours += hours * f64::from(view.record.cpus.unwrap_or(0));
        }

        Ok(summary)
    }
}

/// Descending by job id, numerically when both ids are numbers; ties by
/// submission time ascending
fn sort_newest_first(records: &mut [JobRecord]) {
    records.sort_by(|a, b| {
        let by_id = match (a.job_id.parse::<u64>(), b.job_id.parse::<u64>()) {
            (Ok(x), Ok(y)) => y.cmp(&x),
            _ => b.job_id.cmp(&a.job_id),
        };
        match by_id {
            Ordering::Equal => a.submit_timestamp.cmp(&b.submit_timestamp),
            other => other,
        }
    });
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    let build = |p: &str| RegexBuilder::new(p).case_insensitive(true).build();
    build(pattern)
        .or_else(|_| build(&regex::escape(pattern)))
        .map_err(|e| TrackerError::InvalidSpec(format!("search pattern: {}", e)))
}

fn requested_hours(record: &JobRecord) -> f64 {
    parse_time_limit(&record.time_limit).unwrap_or_else(|| {
        warn!(
            "Job {} has unparseable time limit '{}', counting 1 hour",
            record.job_id, record.time_limit
        );
        1.0
    })
}
