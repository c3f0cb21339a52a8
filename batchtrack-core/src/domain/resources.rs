//! Resource requests
//!
//! What a job asks the scheduler for, plus the time-limit arithmetic used
//! to estimate requested GPU and CPU hours.

use serde::{Deserialize, Serialize};

/// Resources requested for a single job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub gpus: u32,
    /// Wall-clock limit in scheduler syntax (e.g. `01:00:00`)
    pub time_limit: String,
    /// Memory in scheduler syntax (e.g. `48g`)
    pub memory: String,
    pub cpus: u32,
    pub partition: String,
    pub nodes: u32,
    pub ntasks: u32,
    pub ntasks_per_node: u32,
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            gpus: 1,
            time_limit: "00:30:00".to_string(),
            memory: "48g".to_string(),
            cpus: 8,
            partition: "long".to_string(),
            nodes: 1,
            ntasks: 1,
            ntasks_per_node: 1,
        }
    }
}

/// Parse a scheduler time limit into hours
///
/// Accepts `D-HH:MM:SS`, `D-HH`, `HH:MM:SS`, `MM:SS` and bare minutes.
/// Returns `None` for anything else.
pub fn parse_time_limit(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (days, clock) = match raw.split_once('-') {
        Some((days, rest)) => (days.parse::<u64>().ok()?, rest),
        None => (0, raw),
    };

    let parts = clock
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    let hours = match (raw.contains('-'), parts.as_slice()) {
        (true, [h]) => *h as f64,
        (true, [h, m]) => *h as f64 + *m as f64 / 60.0,
        (_, [h, m, s]) => *h as f64 + *m as f64 / 60.0 + *s as f64 / 3600.0,
        (false, [m, s]) => *m as f64 / 60.0 + *s as f64 / 3600.0,
        (false, [m]) => *m as f64 / 60.0,
        _ => return None,
    };

    Some(days as f64 * 24.0 + hours)
}

/// Render a number of hours the way operators read it
pub fn format_hours(hours: f64) -> String {
    const DAY: f64 = 24.0;
    const WEEK: f64 = DAY * 7.0;

    if hours < DAY {
        format!("{:.1} hours", hours)
    } else if hours < WEEK {
        format!("{:.1} days ({:.1} hours)", hours / DAY, hours)
    } else if hours < WEEK * 52.0 {
        format!("{:.1} weeks ({:.1} days)", hours / WEEK, hours / DAY)
    } else {
        format!("{:.1} years ({:.1} weeks)", hours / (DAY * 365.0), hours / WEEK)
    }
}
