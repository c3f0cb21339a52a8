//! Job command handlers
//!
//! Handles listing, searching, filtering and inspecting tracked jobs.

use anyhow::{Context, Result};
use batchtrack_core::domain::resources::format_hours;
use batchtrack_core::domain::status::JobStatus;
use batchtrack_core::dto::job::{JobView, StatusSummary};
use batchtrack_tracker::Tracker;
use batchtrack_tracker::service::StatusFilter;
use colored::*;
use serde::Serialize;

/// List jobs newest first
pub async fn list_jobs(
    tracker: &Tracker,
    limit: Option<usize>,
    verbose: bool,
    json: bool,
) -> Result<()> {
    let views = tracker.queries.list(limit).await?;

    if json {
        return print_json(&views);
    }

    if views.is_empty() {
        println!("{}", "No tracked jobs found.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} job(s):", views.len()).bold());
    println!();
    print_table(&views, verbose);
    Ok(())
}

/// Show one job with every stored field
pub async fn show_job(tracker: &Tracker, job_id: &str, json: bool) -> Result<()> {
    let view = tracker.queries.detail(job_id).await?;

    if json {
        return print_json(&view);
    }

    print_job_details(&view);
    Ok(())
}

/// Show jobs with any field matching `pattern`
pub async fn search_jobs(tracker: &Tracker, pattern: &str) -> Result<()> {
    let views = tracker.queries.search(pattern).await?;

    if views.is_empty() {
        println!("{}", format!("No jobs match '{}'.", pattern).yellow());
    } else {
        println!(
            "{}",
            format!("Found {} job(s) matching '{}':", views.len(), pattern).bold()
        );
        println!();
        print_table(&views, false);
    }

    Ok(())
}

/// Show jobs in one status group
pub async fn filter_jobs(tracker: &Tracker, filter: StatusFilter) -> Result<()> {
    let views = tracker.queries.filter(filter).await?;
    let label = match filter {
        StatusFilter::Active => "active",
        StatusFilter::Failed => "failed",
        StatusFilter::Completed => "completed",
    };

    if views.is_empty() {
        println!("{}", format!("No {} jobs.", label).yellow());
    } else {
        println!("{}", format!("Found {} {} job(s):", views.len(), label).bold());
        println!();
        print_table(&views, false);
    }

    Ok(())
}

/// Show counts per status and requested resources of active jobs
pub async fn show_summary(tracker: &Tracker, json: bool) -> Result<()> {
    let summary = tracker.queries.summary().await?;

    if json {
        return print_json(&summary);
    }

    print_summary(&summary);
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

fn print_table(views: &[JobView], verbose: bool) {
    let stage_width = views
        .iter()
        .map(|v| v.record.stage().len())
        .max()
        .unwrap_or(0)
        .max("STAGE".len());

    let mut header = format!(
        "  {:<10} {:<stage_width$} {:<10} {:<19}",
        "JOB ID", "STAGE", "STATUS", "SUBMITTED"
    );
    if verbose {
        header.push_str(&format!(
            " {:>4} {:>4} {:>6} {:>10} {:<10} LOG",
            "GPUS", "CPUS", "MEM", "TIME", "PARTITION"
        ));
    }
    println!("{}", header.dimmed());

    for view in views {
        let record = &view.record;
        let mut row = format!(
            "  {} {:<stage_width$} {} {:<19}",
            format!("{:<10}", record.job_id).cyan(),
            record.stage(),
            colorize_status(view.status),
            record.submit_time
        );
        if verbose {
            let number = |n: Option<u32>| n.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
            row.push_str(&format!(
                " {:>4} {:>4} {:>6} {:>10} {:<10} {}",
                number(record.gpus),
                number(record.cpus),
                record.memory,
                record.time_limit,
                record.partition,
                record.log_file_path.dimmed()
            ));
        }
        println!("{}", row);
    }
}

/// Print detailed job information
fn print_job_details(view: &JobView) {
    let record = &view.record;
    let optional = |n: Option<u32>| n.map(|n| n.to_string()).unwrap_or_else(|| "-".into());

    println!("{}", "Job Details:".bold());
    println!("  ID:          {}", record.job_id.cyan());
    println!("  Stage:       {}", record.stage());
    println!("  Status:      {}", colorize_status(view.status));
    println!("  Submitted:   {}", record.submit_time);
    println!("  Log:         {}", record.log_file_path);
    if record.has_dependency() {
        println!("  Depends on:  {}", record.dependency);
    }

    println!("\n{}", "Resources:".bold());
    println!("  Partition:   {}", record.partition);
    println!("  Nodes:       {}", optional(record.nodes));
    println!("  CPUs:        {}", optional(record.cpus));
    println!("  GPUs:        {}", optional(record.gpus));
    println!("  Memory:      {}", record.memory);
    println!("  Time limit:  {}", record.time_limit);

    println!("\n{}", "Provenance:".bold());
    println!("  User:        {}", record.user);
    println!("  Host:        {}", record.hostname);
    println!("  Directory:   {}", record.working_dir);
    println!("  Commit:      {}", record.git_commit);
    println!("  Run group:   {}", record.run_group_id);
}

fn print_summary(summary: &StatusSummary) {
    println!("{}", "Job Summary:".bold());
    println!("  Total:       {}", summary.total);
    println!("  Running:     {}", summary.running.to_string().cyan());
    println!("  Pending:     {}", summary.pending.to_string().yellow());
    println!("  Completed:   {}", summary.completed.to_string().green());
    println!("  Failed:      {}", summary.failed.to_string().red());
    if summary.unknown > 0 {
        println!("  Unknown:     {}", summary.unknown.to_string().dimmed());
    }

    if summary.running + summary.pending > 0 {
        println!("\n{}", "Requested by active jobs:".bold());
        println!("  GPU time:    {}", format_hours(summary.active_gpu_hours));
        println!("  CPU time:    {}", format_hours(summary.active_cpu_hours));
    }
}

/// Colorize job status for display, padded to a fixed width
fn colorize_status(status: JobStatus) -> ColoredString {
    let status_str = format!("{:<10}", status.as_str());
    match status {
        JobStatus::Submitted | JobStatus::Pending => status_str.yellow(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Completed => status_str.green(),
        JobStatus::Failed | JobStatus::Timeout => status_str.red(),
        JobStatus::Cancelled | JobStatus::Unknown => status_str.dimmed(),
    }
}
