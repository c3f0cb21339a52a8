//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod clean;
mod jobs;
mod logs;
mod pipeline;
mod submit;

pub use pipeline::PipelineArgs;
pub use submit::SubmitArgs;

use anyhow::Result;
use batchtrack_scheduler::SlurmScheduler;
use batchtrack_tracker::Tracker;
use batchtrack_tracker::service::StatusFilter;
use clap::Subcommand;
use std::sync::Arc;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a stage@step job to the scheduler
    Submit(SubmitArgs),
    /// Submit the jobs of a parameters file in dependency order
    Pipeline(PipelineArgs),
    /// List tracked jobs, newest first
    List {
        /// Show at most this many jobs
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Include resources and the log path
        #[arg(short, long)]
        verbose: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one job in detail, or every job's status
    Status {
        /// Job ID
        job_id: Option<String>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Find jobs with any field matching a pattern
    Search {
        /// Case-insensitive regular expression or plain text
        pattern: String,
    },
    /// Jobs submitted, pending or running
    Active,
    /// Jobs that failed, were cancelled or timed out
    Failed,
    /// Jobs that completed
    Completed,
    /// Print a job's full log
    Logs {
        /// Job ID
        job_id: String,
    },
    /// Print the end of a job's log
    Tail {
        /// Job ID
        job_id: String,

        /// Number of lines
        #[arg(default_value_t = batchtrack_tracker::service::DEFAULT_TAIL_LINES)]
        lines: usize,
    },
    /// Stream a job's log until interrupted
    Follow {
        /// Job ID
        job_id: String,
    },
    /// Remove records older than a number of days
    Clean {
        /// Age threshold in days (default: BATCHTRACK_RETENTION_DAYS or 30)
        days: Option<u64>,

        /// Only show what would be removed
        #[arg(long)]
        dry_run: bool,
    },
    /// Job counts per status and requested resources
    Summary {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let scheduler = Arc::new(SlurmScheduler::new(config.slurm.clone()));
    let tracker = Tracker::new(config.tracker.clone(), scheduler.clone());

    match command {
        Commands::Submit(args) => submit::handle_submit(args, &tracker, &scheduler).await,
        Commands::Pipeline(args) => pipeline::handle_pipeline(args, &tracker).await,
        Commands::List {
            limit,
            verbose,
            json,
        } => jobs::list_jobs(&tracker, limit, verbose, json).await,
        Commands::Status { job_id, json } => match job_id {
            Some(job_id) => jobs::show_job(&tracker, &job_id, json).await,
            None => jobs::list_jobs(&tracker, None, false, json).await,
        },
        Commands::Search { pattern } => jobs::search_jobs(&tracker, &pattern).await,
        Commands::Active => jobs::filter_jobs(&tracker, StatusFilter::Active).await,
        Commands::Failed => jobs::filter_jobs(&tracker, StatusFilter::Failed).await,
        Commands::Completed => jobs::filter_jobs(&tracker, StatusFilter::Completed).await,
        Commands::Logs { job_id } => logs::show_log(&tracker, &job_id).await,
        Commands::Tail { job_id, lines } => logs::tail_log(&tracker, &job_id, lines).await,
        Commands::Follow { job_id } => logs::follow_log(&tracker, &job_id).await,
        Commands::Clean { days, dry_run } => {
            let days = days.unwrap_or(config.tracker.retention_days);
            clean::clean_records(&tracker, days, dry_run)
        }
        Commands::Summary { json } => jobs::show_summary(&tracker, json).await,
    }
}
