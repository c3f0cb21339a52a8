//! Batchtrack Scheduler Client
//!
//! The boundary between batchtrack and the cluster it submits to.
//!
//! This crate provides:
//! - The [`Scheduler`] trait: one submission call and one batched status
//!   query, the only two things the tracker ever asks of a scheduler
//! - [`SlurmScheduler`]: the implementation backed by `sbatch` and `squeue`
//! - [`CredentialLoader`]: the source of the opaque tokens forwarded to jobs
//!
//! # Example
//!
//! ```no_run
//! use batchtrack_scheduler::{Scheduler, SlurmConfig, SlurmScheduler};
//!
//! # async fn example() -> batchtrack_scheduler::Result<()> {
//! let scheduler = SlurmScheduler::new(SlurmConfig::default());
//! let states = scheduler
//!     .batch_status(&["4411".to_string(), "4412".to_string()])
//!     .await?;
//! for (job_id, state) in states {
//!     println!("{job_id}: {state}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod credentials;
pub mod error;
mod slurm;

pub use credentials::{CredentialLoader, Credentials, EnvCredentialLoader};
pub use error::{CredentialError, Result, SchedulerError};
pub use slurm::{SlurmConfig, SlurmScheduler, parse_queue_states, parse_submitted_job_id};

use async_trait::async_trait;
use batchtrack_core::dto::submit::SubmitRequest;
use std::collections::HashMap;

/// Operations the tracker needs from an external batch scheduler
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Submits one job and returns the identifier the scheduler assigned
    ///
    /// # Arguments
    /// * `request` - The fully resolved submission
    async fn submit(&self, request: &SubmitRequest) -> Result<String>;

    /// Reports the raw scheduler state of every listed job still known to it
    ///
    /// Implementations must answer with a single query regardless of how
    /// many ids are passed. Jobs that have left the queue are simply absent
    /// from the returned map.
    ///
    /// # Arguments
    /// * `job_ids` - The jobs to look up
    async fn batch_status(&self, job_ids: &[String]) -> Result<HashMap<String, String>>;
}
