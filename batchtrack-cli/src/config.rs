//! Configuration module
//!
//! Turns global flags and their environment fallbacks into the tracker and
//! scheduler configuration, detecting provenance once. Tracker settings
//! are read from the environment only through the flags below.

use anyhow::{Context, Result};
use batchtrack_scheduler::SlurmConfig;
use batchtrack_tracker::{Provenance, TrackerConfig};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Flags accepted before any subcommand
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Directory holding one record per job
    #[arg(long, global = true, env = "BATCHTRACK_TRACKING_DIR")]
    pub tracking_dir: Option<PathBuf>,

    /// Root directory for job logs
    #[arg(long, global = true, env = "BATCHTRACK_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Seconds to wait for the scheduler's status answer
    #[arg(long, global = true, env = "BATCHTRACK_STATUS_TIMEOUT")]
    pub status_timeout: Option<u64>,

    /// Milliseconds between log checks while following
    #[arg(long, global = true, env = "BATCHTRACK_FOLLOW_POLL_MS")]
    pub follow_poll_ms: Option<u64>,

    /// Default age threshold for `clean`, in days
    #[arg(long, global = true, env = "BATCHTRACK_RETENTION_DAYS")]
    pub retention_days: Option<u64>,

    /// Skip scheduler status checks; every status shows as UNKNOWN
    #[arg(long, global = true)]
    pub no_status: bool,
}

impl GlobalArgs {
    /// Tracker defaults overridden by whatever was given
    fn tracker_config(self) -> TrackerConfig {
        let mut tracker = TrackerConfig::default();

        if let Some(dir) = self.tracking_dir {
            tracker.tracking_dir = dir;
        }
        if let Some(dir) = self.log_dir {
            tracker.log_dir = dir;
        }
        if let Some(secs) = self.status_timeout {
            tracker.status_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.follow_poll_ms {
            tracker.follow_poll_interval = Duration::from_millis(ms);
        }
        if let Some(days) = self.retention_days {
            tracker.retention_days = days;
        }
        tracker.status_checks = !self.no_status;

        tracker
    }
}

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub slurm: SlurmConfig,
}

impl Config {
    /// Builds the configuration, flags taking precedence over the environment
    pub async fn load(args: GlobalArgs) -> Result<Self> {
        let tracker = args
            .tracker_config()
            .with_provenance(Provenance::detect().await);
        tracker.validate().context("Invalid configuration")?;

        Ok(Self {
            tracker,
            slurm: SlurmConfig::from_env(),
        })
    }
}
