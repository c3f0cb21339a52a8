//! `.meta` record codec
//!
//! One record per file, newline separated `KEY=VALUE` pairs. Values may be
//! double quoted; the writer quotes only values that need it. Readers skip
//! blank lines, `#` comments and keys they do not recognize.

use std::collections::HashMap;
use thiserror::Error;

use crate::domain::job::{JobRecord, NO_DEPENDENCY};

/// File extension of a persisted record
pub const META_EXTENSION: &str = "meta";

/// Errors raised while decoding a `.meta` file
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaParseError {
    #[error("missing required key {0}")]
    MissingKey(&'static str),

    #[error("line {line}: expected KEY=VALUE, found '{content}'")]
    MalformedLine { line: usize, content: String },
}

/// Serialize a record into `.meta` text
pub fn encode(record: &JobRecord) -> String {
    let mut out = String::new();
    for (key, value) in record.fields() {
        out.push_str(key);
        out.push('=');
        out.push_str(&quote(&value));
        out.push('\n');
    }
    out
}

/// Parse `.meta` text into a record
///
/// Only `JOB_ID` is required. `STAGE_NAME`/`STEP_NAME` fall back to the
/// halves of `STAGE`, numeric descriptors that do not parse are dropped,
/// and a missing `DEPENDENCY` reads as `none`.
pub fn decode(text: &str) -> Result<JobRecord, MetaParseError> {
    let mut values: HashMap<String, String> = HashMap::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| MetaParseError::MalformedLine {
                line: index + 1,
                content: raw.to_string(),
            })?;

        values.insert(key.trim().to_string(), unquote(value.trim()));
    }

    let job_id = values
        .remove("JOB_ID")
        .filter(|id| !id.is_empty())
        .ok_or(MetaParseError::MissingKey("JOB_ID"))?;

    let mut take = |key: &str| values.remove(key).unwrap_or_default();

    let stage = take("STAGE");
    let (stage_half, step_half) = stage
        .split_once('@')
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .unwrap_or((stage.clone(), String::new()));

    let stage_name = Some(take("STAGE_NAME"))
        .filter(|s| !s.is_empty())
        .unwrap_or(stage_half);
    let step_name = Some(take("STEP_NAME"))
        .filter(|s| !s.is_empty())
        .unwrap_or(step_half);

    let submit_timestamp = take("SUBMIT_TIMESTAMP").parse::<i64>().unwrap_or(0);
    let dependency = Some(take("DEPENDENCY"))
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| NO_DEPENDENCY.to_string());

    Ok(JobRecord {
        job_id,
        stage_name,
        step_name,
        submit_time: take("SUBMIT_TIME"),
        submit_timestamp,
        log_file_path: take("LOG_FILE"),
        last_known_status: take("STATUS"),
        user: take("USER"),
        partition: take("PARTITION"),
        nodes: take("NODES").parse().ok(),
        cpus: take("CPUS").parse().ok(),
        memory: take("MEMORY"),
        gpus: take("GPUS").parse().ok(),
        time_limit: take("TIME_LIMIT"),
        dependency,
        git_commit: take("GIT_COMMIT"),
        hostname: take("HOSTNAME"),
        working_dir: take("WORKING_DIR"),
        run_group_id: take("RUN_GROUP_ID"),
    })
}

fn needs_quotes(value: &str) -> bool {
    value.chars().any(|c| {
        c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '#' | '$' | '`' | ';' | '&' | '|')
    })
}

fn quote(value: &str) -> String {
    if !needs_quotes(value) {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' | '$' | '`' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn unquote(value: &str) -> String {
    let inner = match value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    {
        Some(inner) => inner,
        None => {
            return value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .unwrap_or(value)
                .to_string();
        }
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(next) => out.push(next),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::fixtures::record;

    #[test]
    fn test_encode_plain_values_unquoted() {
        let text = encode(&record("555", "combined_inference", "stepA"));
        assert!(text.contains("JOB_ID=555\n"));
        assert!(text.contains("STAGE=combined_inference@stepA\n"));
        assert!(text.contains("STAGE_NAME=combined_inference\n"));
        assert!(text.contains("STEP_NAME=stepA\n"));
        assert!(text.contains("GPUS=2\n"));
        assert!(text.contains("SUBMIT_TIME=\"2026-10-18 09:30:00\"\n"));
    }

    #[test]
    fn test_decode_encoded_record() {
        let mut job = record("42", "evaluation", "eval1");
        job.working_dir = "/home/op/my \"quoted\" dir".to_string();

        let decoded = decode(&encode(&job)).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_decode_shell_written_file() {
        let text = r#"
# written by the legacy tracker
JOB_ID=777
STAGE="training@t1"
SUBMIT_TIME="Sat Oct 18 09:30:00 UTC 2026"
SUBMIT_TIMESTAMP=1792316200
LOG_FILE=/scratch/logs/training/t1_777.out
STATUS=SUBMITTED
GPUS=4
FUTURE_FIELD=ignored
"#;
        let job = decode(text).unwrap();
        assert_eq!(job.job_id, "777");
        assert_eq!(job.stage_name, "training");
        assert_eq!(job.step_name, "t1");
        assert_eq!(job.gpus, Some(4));
        assert_eq!(job.cpus, None);
        assert_eq!(job.dependency, NO_DEPENDENCY);
        assert_eq!(job.submit_time, "Sat Oct 18 09:30:00 UTC 2026");
    }

    #[test]
    fn test_decode_requires_job_id() {
        assert_eq!(
            decode("STAGE=a@b\n"),
            Err(MetaParseError::MissingKey("JOB_ID"))
        );
        assert_eq!(decode("JOB_ID=\n"), Err(MetaParseError::MissingKey("JOB_ID")));
    }

    #[test]
    fn test_decode_rejects_malformed_line() {
        let err = decode("JOB_ID=1\nnot a pair\n").unwrap_err();
        assert!(matches!(err, MetaParseError::MalformedLine { line: 2, .. }));
    }
}
