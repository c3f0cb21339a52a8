//! Retention Service
//!
//! Age-based removal of records. Only the record files are removed; job
//! logs are left where they are.

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

use crate::error::Result;
use crate::repository::{RecordEntry, RecordStore};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records looked at
    pub examined: usize,
    /// Job ids removed
    pub removed: Vec<String>,
    /// Job ids that were due but could not be removed
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct RetentionService {
    store: Arc<dyn RecordStore>,
}

impl RetentionService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Removes records last modified more than `max_age_days` ago
    pub fn clean(&self, max_age_days: u64) -> Result<SweepReport> {
        self.clean_at(max_age(max_age_days), SystemTime::now())
    }

    /// Records a sweep would remove, without removing anything
    pub fn expired(&self, max_age_days: u64) -> Result<Vec<RecordEntry>> {
        let cutoff = cutoff(max_age(max_age_days), SystemTime::now());
        Ok(self
            .store
            .entries()?
            .into_iter()
            .filter(|entry| entry.modified < cutoff)
            .collect())
    }

    /// Sweep against an explicit clock
    ///
    /// A record that cannot be removed is logged and the sweep carries on.
    pub fn clean_at(&self, max_age: Duration, now: SystemTime) -> Result<SweepReport> {
        let cutoff = cutoff(max_age, now);
        let entries = self.store.entries()?;
        let mut report = SweepReport {
            examined: entries.len(),
            ..SweepReport::default()
        };

        for entry in entries.into_iter().filter(|e| e.modified < cutoff) {
            match self.store.delete(&entry.job_id) {
                Ok(true) => report.removed.push(entry.job_id),
                // Already gone
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to remove record {}: {}", entry.job_id, e);
                    report.failed.push(entry.job_id);
                }
            }
        }

        info!(
            "Retention sweep removed {} of {} record(s)",
            report.removed.len(),
            report.examined
        );
        Ok(report)
    }
}

fn max_age(days: u64) -> Duration {
    Duration::from_secs(days.saturating_mul(SECS_PER_DAY))
}

fn cutoff(max_age: Duration, now: SystemTime) -> SystemTime {
    now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::FileRecordStore;
    use crate::test_support::record;
    use std::fs::File;
    use tempfile::TempDir;

    fn age(store: &FileRecordStore, job_id: &str, days: u64) {
        let file = File::options()
            .write(true)
            .open(store.dir().join(format!("{job_id}.meta")))
            .unwrap();
        file.set_modified(SystemTime::now() - max_age(days)).unwrap();
    }

    #[test]
    fn test_clean_removes_only_old_records() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(FileRecordStore::new(tmp.path().join("tracking")));
        for id in ["1", "2", "3"] {
            store.put(&record(id, "s", "t")).unwrap();
        }
        age(&store, "1", 45);
        age(&store, "2", 31);
        age(&store, "3", 29);

        let service = RetentionService::new(store.clone());
        assert_eq!(service.expired(30).unwrap().len(), 2);

        let mut report = service.clean(30).unwrap();
        report.removed.sort();
        assert_eq!(report.examined, 3);
        assert_eq!(report.removed, ["1", "2"]);
        assert!(store.get("3").is_ok());

        let again = service.clean(30).unwrap();
        assert!(again.removed.is_empty());
        assert_eq!(again.examined, 1);
    }

    #[test]
    fn test_clean_empty_store() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(FileRecordStore::new(tmp.path().join("missing")));
        let report = RetentionService::new(store).clean(0).unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[test]
    fn test_huge_age_does_not_overflow() {
        assert_eq!(
            cutoff(max_age(u64::MAX), SystemTime::now()),
            SystemTime::UNIX_EPOCH
        );
    }
}
