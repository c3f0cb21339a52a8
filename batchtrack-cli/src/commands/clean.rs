//! Clean command handler

use anyhow::Result;
use batchtrack_tracker::Tracker;
use colored::*;

/// Remove records older than `days`, or list them on a dry run
pub fn clean_records(tracker: &Tracker, days: u64, dry_run: bool) -> Result<()> {
    if dry_run {
        let expired = tracker.retention.expired(days)?;
        if expired.is_empty() {
            println!("{}", format!("No records older than {} day(s).", days).yellow());
            return Ok(());
        }

        println!(
            "{}",
            format!("Would remove {} record(s) older than {} day(s):", expired.len(), days).bold()
        );
        for entry in expired {
            println!("  {} {}", "▸".cyan(), entry.job_id);
        }
        return Ok(());
    }

    let report = tracker.retention.clean(days)?;
    println!(
        "{}",
        format!(
            "Removed {} record(s) older than {} day(s), {} examined.",
            report.removed.len(),
            days,
            report.examined
        )
        .green()
    );

    if !report.failed.is_empty() {
        println!(
            "{}",
            format!("Could not remove: {}", report.failed.join(", ")).yellow()
        );
    }

    Ok(())
}
