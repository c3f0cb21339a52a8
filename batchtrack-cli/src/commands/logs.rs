//! Log command handlers

use anyhow::Result;
use batchtrack_tracker::Tracker;
use batchtrack_tracker::service::LogContent;
use colored::*;
use std::io::Write;
use std::path::Path;

use crate::shutdown::install_shutdown_handler;

/// Lines of existing output shown before following new output
const FOLLOW_BACKLOG: usize = 10;

pub async fn show_log(tracker: &Tracker, job_id: &str) -> Result<()> {
    match tracker.logs.show(job_id).await? {
        LogContent::NotYetCreated(path) => print_not_created(job_id, &path),
        LogContent::Available { content, .. } => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub async fn tail_log(tracker: &Tracker, job_id: &str, lines: usize) -> Result<()> {
    match tracker.logs.tail(job_id, lines).await? {
        LogContent::NotYetCreated(path) => print_not_created(job_id, &path),
        LogContent::Available { content, .. } => {
            for line in content {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

/// Stream the log until Ctrl-C or SIGTERM
pub async fn follow_log(tracker: &Tracker, job_id: &str) -> Result<()> {
    let token = install_shutdown_handler();

    eprintln!(
        "{}",
        format!("Following job {} (Ctrl-C to stop)", job_id).dimmed()
    );
    let summary = tracker
        .logs
        .follow(job_id, FOLLOW_BACKLOG, &token, |line| println!("{}", line))
        .await?;
    eprintln!(
        "{}",
        format!("Stopped after {} line(s)", summary.lines).dimmed()
    );

    Ok(())
}

fn print_not_created(job_id: &str, path: &Path) {
    println!(
        "{}",
        format!("Log for job {} not created yet.", job_id).yellow()
    );
    println!("  Expected at: {}", path.display().to_string().dimmed());
}
