//! Canonical job status
//!
//! Scheduler vocabulary (long names and the abbreviated codes `squeue`
//! prints) is normalized through a single lookup table. Supporting a new
//! scheduler state is a table entry, not a new branch in the callers.

use serde::{Deserialize, Serialize};

/// Canonical job status
///
/// `Submitted` and `Pending` are non-terminal waiting states, `Running` is
/// the only executing state, and the remaining outcomes are terminal.
/// `Unknown` is only produced when status checking is turned off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    Unknown,
}

/// Scheduler state names and codes, mapped onto the canonical set.
const SCHEDULER_STATES: &[(&str, JobStatus)] = &[
    ("SUBMITTED", JobStatus::Submitted),
    ("PENDING", JobStatus::Pending),
    ("PD", JobStatus::Pending),
    ("CONFIGURING", JobStatus::Pending),
    ("CF", JobStatus::Pending),
    ("REQUEUED", JobStatus::Pending),
    ("RQ", JobStatus::Pending),
    ("REQUEUE_HOLD", JobStatus::Pending),
    ("RH", JobStatus::Pending),
    ("REQUEUE_FED", JobStatus::Pending),
    ("RF", JobStatus::Pending),
    ("SUSPENDED", JobStatus::Pending),
    ("S", JobStatus::Pending),
    ("RUNNING", JobStatus::Running),
    ("R", JobStatus::Running),
    ("COMPLETING", JobStatus::Running),
    ("CG", JobStatus::Running),
    ("STAGE_OUT", JobStatus::Running),
    ("SO", JobStatus::Running),
    ("COMPLETED", JobStatus::Completed),
    ("CD", JobStatus::Completed),
    ("FAILED", JobStatus::Failed),
    ("F", JobStatus::Failed),
    ("NODE_FAIL", JobStatus::Failed),
    ("NF", JobStatus::Failed),
    ("BOOT_FAIL", JobStatus::Failed),
    ("BF", JobStatus::Failed),
    ("OUT_OF_MEMORY", JobStatus::Failed),
    ("OOM", JobStatus::Failed),
    ("PREEMPTED", JobStatus::Failed),
    ("PR", JobStatus::Failed),
    ("CANCELLED", JobStatus::Cancelled),
    ("CANCELED", JobStatus::Cancelled),
    ("CA", JobStatus::Cancelled),
    ("TIMEOUT", JobStatus::Timeout),
    ("TO", JobStatus::Timeout),
    ("DEADLINE", JobStatus::Timeout),
    ("DL", JobStatus::Timeout),
    ("UNKNOWN", JobStatus::Unknown),
];

impl JobStatus {
    /// Normalize a raw scheduler state into the canonical set
    ///
    /// Accepts either case, surrounding whitespace, trailing qualifiers
    /// (`CANCELLED by 1000`) and the `+` suffix accounting tools append.
    /// Returns `None` for vocabulary the table does not know.
    pub fn normalize(raw: &str) -> Option<Self> {
        let token = raw.split_whitespace().next()?;
        let token = token.trim_end_matches('+').to_ascii_uppercase();

        SCHEDULER_STATES
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, status)| *status)
    }

    /// Canonical upper-case name, as written to `.meta` files
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Timeout => "TIMEOUT",
            JobStatus::Unknown => "UNKNOWN",
        }
    }

    /// Whether the job has reached an outcome the scheduler will not change
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
        )
    }

    /// Waiting for or holding cluster resources
    ///
    /// A `SUBMITTED` snapshot counts: it only survives reconciliation when
    /// the scheduler could not be asked, and such a job is presumed queued.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Submitted | JobStatus::Pending | JobStatus::Running
        )
    }

    /// Terminal outcomes other than a clean completion
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_abbreviated_codes() {
        assert_eq!(JobStatus::normalize("R"), Some(JobStatus::Running));
        assert_eq!(JobStatus::normalize("PD"), Some(JobStatus::Pending));
        assert_eq!(JobStatus::normalize("CD"), Some(JobStatus::Completed));
        assert_eq!(JobStatus::normalize("CA"), Some(JobStatus::Cancelled));
        assert_eq!(JobStatus::normalize("TO"), Some(JobStatus::Timeout));
        assert_eq!(JobStatus::normalize("F"), Some(JobStatus::Failed));
    }

    #[test]
    fn test_normalize_long_names_and_noise() {
        assert_eq!(JobStatus::normalize(" running\n"), Some(JobStatus::Running));
        assert_eq!(
            JobStatus::normalize("CANCELLED by 1000"),
            Some(JobStatus::Cancelled)
        );
        assert_eq!(JobStatus::normalize("CANCELLED+"), Some(JobStatus::Cancelled));
        assert_eq!(JobStatus::normalize("OUT_OF_MEMORY"), Some(JobStatus::Failed));
    }

    #[test]
    fn test_normalize_rejects_unknown_vocabulary() {
        assert_eq!(JobStatus::normalize(""), None);
        assert_eq!(JobStatus::normalize("   "), None);
        assert_eq!(JobStatus::normalize("SPECIAL_EXIT_2"), None);
    }

    #[test]
    fn test_every_canonical_name_round_trips() {
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
            assert_eq!(JobStatus::normalize(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_buckets() {
        assert!(JobStatus::Running.is_active());
        assert!(JobStatus::Pending.is_active());
        assert!(JobStatus::Submitted.is_active());
        assert!(!JobStatus::Completed.is_active());
        assert!(!JobStatus::Unknown.is_active());
        assert!(!JobStatus::Submitted.is_terminal());
        assert!(JobStatus::Timeout.is_failure());
        assert!(JobStatus::Timeout.is_terminal());
        assert!(!JobStatus::Completed.is_failure());
        assert!(!JobStatus::Unknown.is_terminal());
    }
}
