//! Tracker configuration
//!
//! Defines every tunable of the tracker: where records and logs live, how
//! long to wait for the scheduler, and the provenance stamped into each
//! record. Built once at start-up and handed to each component.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Value used when a provenance field cannot be determined
pub const UNKNOWN: &str = "unknown";

/// Where and by whom jobs are being submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub user: String,
    pub hostname: String,
    pub working_dir: PathBuf,
    /// Short commit of the working tree, `unknown` outside a repository
    pub git_commit: String,
}

impl Provenance {
    /// Detects provenance from the running process
    pub async fn detect() -> Self {
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let git_commit = detect_git_commit(&working_dir).await;

        Self {
            user: detect_user(),
            hostname: detect_hostname(),
            working_dir,
            git_commit,
        }
    }
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            user: UNKNOWN.to_string(),
            hostname: UNKNOWN.to_string(),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            git_commit: UNKNOWN.to_string(),
        }
    }
}

fn detect_user() -> String {
    ["USER", "LOGNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn detect_hostname() -> String {
    if let Some(host) = std::env::var("HOSTNAME").ok().filter(|v| !v.is_empty()) {
        return host;
    }

    ["/proc/sys/kernel/hostname", "/etc/hostname"]
        .iter()
        .find_map(|path| {
            std::fs::read_to_string(path)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| UNKNOWN.to_string())
}

async fn detect_git_commit(dir: &Path) -> String {
    let output = Command::new("git")
        .args(["rev-parse", "--short=6", "HEAD"])
        .current_dir(dir)
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            let commit = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if commit.is_empty() {
                UNKNOWN.to_string()
            } else {
                commit
            }
        }
        Ok(out) => {
            debug!(
                "git rev-parse failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            );
            UNKNOWN.to_string()
        }
        Err(e) => {
            debug!("git unavailable: {}", e);
            UNKNOWN.to_string()
        }
    }
}

/// Tracker configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Directory holding one `<job_id>.meta` file per job
    pub tracking_dir: PathBuf,

    /// Root under which per-stage log directories are created
    pub log_dir: PathBuf,

    /// Upper bound on the batched scheduler status query
    pub status_timeout: Duration,

    /// When false no scheduler query is made and every status is `UNKNOWN`
    pub status_checks: bool,

    /// How often `follow` re-checks the log file
    pub follow_poll_interval: Duration,

    /// Default age threshold for `clean`
    pub retention_days: u64,

    pub provenance: Provenance,
}

impl TrackerConfig {
    /// Creates a new configuration with defaults
    pub fn new(tracking_dir: PathBuf, log_dir: PathBuf) -> Self {
        Self {
            tracking_dir,
            log_dir,
            status_timeout: Duration::from_secs(5),
            status_checks: true,
            follow_poll_interval: Duration::from_millis(1000),
            retention_days: 30,
            provenance: Provenance::default(),
        }
    }

    /// Replaces the detected provenance
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Log root as an absolute path, resolved against the working directory
    pub fn absolute_log_dir(&self) -> PathBuf {
        if self.log_dir.is_absolute() {
            self.log_dir.clone()
        } else {
            self.provenance.working_dir.join(&self.log_dir)
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tracking_dir.as_os_str().is_empty() {
            anyhow::bail!("tracking_dir cannot be empty");
        }

        if self.log_dir.as_os_str().is_empty() {
            anyhow::bail!("log_dir cannot be empty");
        }

        if self.status_timeout.is_zero() {
            anyhow::bail!("status_timeout must be greater than 0");
        }

        if self.follow_poll_interval.is_zero() {
            anyhow::bail!("follow_poll_interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::new(
            PathBuf::from("cluster/tracking"),
            PathBuf::from("cluster/logs"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.status_timeout, Duration::from_secs(5));
        assert_eq!(config.retention_days, 30);
        assert!(config.status_checks);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TrackerConfig::default();

        config.status_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
        config.status_timeout = Duration::from_secs(1);

        config.tracking_dir = PathBuf::new();
        assert!(config.validate().is_err());
        config.tracking_dir = PathBuf::from("/tmp/tracking");

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_absolute_log_dir() {
        let provenance = Provenance {
            working_dir: PathBuf::from("/home/op/project"),
            ..Provenance::default()
        };
        let config = TrackerConfig::new(PathBuf::from("t"), PathBuf::from("cluster/logs"))
            .with_provenance(provenance);
        assert_eq!(
            config.absolute_log_dir(),
            PathBuf::from("/home/op/project/cluster/logs")
        );

        let config = TrackerConfig::new(PathBuf::from("t"), PathBuf::from("/scratch/logs"));
        assert_eq!(config.absolute_log_dir(), PathBuf::from("/scratch/logs"));
    }
}
