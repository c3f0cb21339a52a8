//! Submit command handler

use anyhow::Result;
use batchtrack_core::domain::resources::ResourceRequest;
use batchtrack_core::domain::spec::{Dependency, JobSpec};
use batchtrack_scheduler::{CredentialLoader, EnvCredentialLoader, SlurmScheduler};
use batchtrack_tracker::{Tracker, TrackerError};
use clap::Args;
use colored::*;

/// Arguments of `submit`; unset resources take the tracker defaults
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Job to run, as stage@step
    pub target: String,

    /// GPUs to request
    #[arg(long)]
    pub gpus: Option<u32>,

    /// Wall-clock limit, e.g. 01:00:00 or 2-00:00:00
    #[arg(long)]
    pub time: Option<String>,

    /// Memory, e.g. 48g
    #[arg(long)]
    pub memory: Option<String>,

    /// CPUs per task
    #[arg(long)]
    pub cpus: Option<u32>,

    #[arg(long)]
    pub nodes: Option<u32>,

    #[arg(long)]
    pub ntasks: Option<u32>,

    #[arg(long)]
    pub ntasks_per_node: Option<u32>,

    #[arg(long)]
    pub partition: Option<String>,

    /// Scheduler dependency expression, e.g. afterok:123:124
    #[arg(long, conflicts_with = "after")]
    pub dependency: Option<String>,

    /// Start only after these jobs completed successfully
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub after: Vec<String>,

    /// Run group id; generated from date and commit when omitted
    #[arg(long)]
    pub run_group: Option<String>,

    /// Job name, also the log file prefix (default: stage_step)
    #[arg(long)]
    pub job_name: Option<String>,

    /// Print the scheduler command without submitting
    #[arg(long)]
    pub dry_run: bool,
}

impl SubmitArgs {
    fn into_spec(self) -> JobSpec {
        let defaults = ResourceRequest::default();
        let resources = ResourceRequest {
            gpus: self.gpus.unwrap_or(defaults.gpus),
            time_limit: self.time.unwrap_or(defaults.time_limit),
            memory: self.memory.unwrap_or(defaults.memory),
            cpus: self.cpus.unwrap_or(defaults.cpus),
            partition: self.partition.unwrap_or(defaults.partition),
            nodes: self.nodes.unwrap_or(defaults.nodes),
            ntasks: self.ntasks.unwrap_or(defaults.ntasks),
            ntasks_per_node: self.ntasks_per_node.unwrap_or(defaults.ntasks_per_node),
        };

        let dependency = match self.dependency {
            Some(expr) => Dependency::parse(&expr),
            None => Dependency::parse(&self.after.join(",")),
        };

        JobSpec {
            target: self.target,
            resources,
            dependency,
            run_group: self.run_group,
            job_name: self.job_name,
            env: Default::default(),
        }
    }
}

pub async fn handle_submit(
    args: SubmitArgs,
    tracker: &Tracker,
    scheduler: &SlurmScheduler,
) -> Result<()> {
    let dry_run = args.dry_run;
    let mut spec = args.into_spec();

    if dry_run {
        let prepared = tracker.submissions.prepare(&spec)?;
        println!("{}", "Dry run, nothing submitted:".bold());
        println!("  {}", scheduler.command_line(&prepared.request).join(" "));
        println!(
            "  Log:       {}",
            prepared.request.output_pattern.display().to_string().dimmed()
        );
        println!("  Run group: {}", prepared.request.run_group_id);
        return Ok(());
    }

    let credentials = EnvCredentialLoader::new()
        .load()
        .map_err(TrackerError::from)?;
    spec.env = credentials.into_env();

    let record = tracker.submissions.submit(&spec).await?;

    println!(
        "{} Submitted {} as job {}",
        "✓".green(),
        record.stage().bold(),
        record.job_id.cyan()
    );
    println!("  Log:       {}", record.log_file_path.dimmed());
    println!("  Run group: {}", record.run_group_id);
    if record.has_dependency() {
        println!("  After:     {}", record.dependency);
    }

    Ok(())
}
