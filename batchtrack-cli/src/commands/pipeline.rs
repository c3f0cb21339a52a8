//! Pipeline command handler
//!
//! Previews and submits every job of a parameters file in dependency order.

use anyhow::Result;
use batchtrack_core::domain::pipeline::PipelinePlan;
use batchtrack_core::domain::resources::format_hours;
use batchtrack_scheduler::{CredentialLoader, EnvCredentialLoader};
use batchtrack_tracker::service::{DEFAULT_PARAMS_FILE, PipelineReport, load_pipeline, select_jobs};
use batchtrack_tracker::{Tracker, TrackerError};
use clap::Args;
use colored::*;
use std::path::PathBuf;

/// Arguments of `pipeline`
#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// Jobs to run with their dependencies: a stage@step key, a stage, a
    /// glob, a regex or a substring (default: every job)
    pub target: Option<String>,

    /// Parameters file declaring the pipeline's jobs
    #[arg(long, default_value = DEFAULT_PARAMS_FILE, env = "BATCHTRACK_PARAMS")]
    pub params: PathBuf,

    /// Run group shared by every job; generated when omitted
    #[arg(long)]
    pub run_group: Option<String>,

    /// Print the execution plan without submitting
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn handle_pipeline(args: PipelineArgs, tracker: &Tracker) -> Result<()> {
    let pipeline = load_pipeline(&args.params)?;
    let selected = select_jobs(&pipeline, args.target.as_deref())?;
    let plan = pipeline.plan(&selected).map_err(TrackerError::from)?;

    print_plan(&plan);

    if args.dry_run {
        println!("\n{}", "Dry run, nothing submitted.".yellow());
        return Ok(());
    }
    if plan.job_count() == 0 {
        return Ok(());
    }

    let credentials = EnvCredentialLoader::new()
        .load()
        .map_err(TrackerError::from)?;
    let env = credentials.into_env();

    println!();
    let report = tracker
        .pipelines
        .run(&plan, args.run_group.as_deref(), &env)
        .await;
    print_report(&report);

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} pipeline job(s) were not submitted",
            report.failed.len() + report.skipped.len(),
            plan.job_count()
        );
    }
    Ok(())
}

fn print_plan(plan: &PipelinePlan) {
    println!("{}", "Execution plan:".bold());
    if plan.skipped > 0 {
        println!(
            "  {} job(s) to run, {} outside the target",
            plan.job_count(),
            plan.skipped
        );
    } else {
        println!("  Running all {} job(s)", plan.job_count());
    }

    for (index, batch) in plan.batches.iter().enumerate() {
        println!(
            "\n{} ({} job(s) in parallel)",
            format!("Batch {}", index + 1).bold(),
            batch.jobs.len()
        );
        println!(
            "  Peak resources: {} GPUs, {} CPUs, up to {:.1}h",
            batch.peak_gpus(),
            batch.peak_cpus(),
            batch.max_hours()
        );

        for job in &batch.jobs {
            let res = &job.resources;
            println!("  {}", job.key().cyan());
            println!(
                "    GPUs: {}, Time: {} ({:.1} GPU-h)",
                res.gpus,
                res.time_limit,
                job.gpu_hours()
            );
            println!(
                "    Memory: {}, CPUs: {} ({:.1} CPU-h)",
                res.memory,
                res.cpus,
                job.cpu_hours()
            );
            if !job.after.is_empty() {
                println!("    {}", format!("After: {}", job.after.join(", ")).dimmed());
            }
        }
    }

    println!("\n{}", "Requested in total:".bold());
    println!("  GPU time:    {}", format_hours(plan.gpu_hours()));
    println!("  CPU time:    {}", format_hours(plan.cpu_hours()));
}

fn print_report(report: &PipelineReport) {
    for record in &report.submitted {
        let after = if record.has_dependency() {
            format!(" after {}", record.dependency).dimmed().to_string()
        } else {
            String::new()
        };
        println!(
            "{} {} as job {}{}",
            "✓".green(),
            record.stage().bold(),
            record.job_id.cyan(),
            after
        );
    }
    for (key, reason) in &report.failed {
        println!("{} {}: {}", "✗".red(), key.bold(), reason);
    }
    for key in &report.skipped {
        println!("{} {} (upstream not submitted)", "-".dimmed(), key.dimmed());
    }

    println!("\n  Run group: {}", report.run_group_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: PipelineArgs,
    }

    #[test]
    fn test_defaults() {
        let args = Harness::try_parse_from(["pipeline"]).unwrap().args;
        assert_eq!(args.params, PathBuf::from("params.yaml"));
        assert!(args.target.is_none());
        assert!(!args.dry_run);
    }

    #[test]
    fn test_target_and_flags() {
        let args = Harness::try_parse_from([
            "pipeline",
            "training@*",
            "--params",
            "cfg/params.yaml",
            "--run-group",
            "nightly",
            "--dry-run",
        ])
        .unwrap()
        .args;
        assert_eq!(args.target.as_deref(), Some("training@*"));
        assert_eq!(args.params, PathBuf::from("cfg/params.yaml"));
        assert_eq!(args.run_group.as_deref(), Some("nightly"));
        assert!(args.dry_run);
    }
}
