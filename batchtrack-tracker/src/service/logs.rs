//! Log Service
//!
//! Reads the output file a record points to. Jobs that have not started
//! have no log yet, which is reported as [`LogContent::NotYetCreated`]
//! rather than as an error.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, TrackerError};
use crate::repository::RecordStore;

/// Lines shown by `tail` when no count is given
pub const DEFAULT_TAIL_LINES: usize = 50;

/// A job log, or the path it will appear at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogContent<T> {
    NotYetCreated(PathBuf),
    Available { path: PathBuf, content: T },
}

/// Outcome of a `follow` session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowSummary {
    /// Lines delivered to the caller, backlog included
    pub lines: usize,
}

/// Read, tail and follow job logs
#[derive(Clone)]
pub struct LogService {
    store: Arc<dyn RecordStore>,
    poll_interval: Duration,
}

impl LogService {
    pub fn new(store: Arc<dyn RecordStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    fn log_path(&self, job_id: &str) -> Result<PathBuf> {
        Ok(PathBuf::from(self.store.get(job_id)?.log_file_path))
    }

    /// Full content of the job's log
    pub async fn show(&self, job_id: &str) -> Result<LogContent<String>> {
        let path = self.log_path(job_id)?;
        match read_lossy(&path).await? {
            Some(content) => Ok(LogContent::Available { path, content }),
            None => Ok(LogContent::NotYetCreated(path)),
        }
    }

    /// Last `lines` lines of the job's log, in file order
    pub async fn tail(&self, job_id: &str, lines: usize) -> Result<LogContent<Vec<String>>> {
        let path = self.log_path(job_id)?;
        let Some(text) = read_lossy(&path).await? else {
            return Ok(LogContent::NotYetCreated(path));
        };

        let all: Vec<&str> = text.lines().collect();
        let start = all.len().saturating_sub(lines);
        let content = all[start..].iter().map(|l| l.to_string()).collect();
        Ok(LogContent::Available { path, content })
    }

    /// Streams the job's log to `on_line` until `token` is cancelled
    ///
    /// Waits for the file to appear if needed, delivers the last `backlog`
    /// complete lines, then every line appended afterwards. A file that is
    /// truncated, rewritten or replaced is read again from the start.
    pub async fn follow<F>(
        &self,
        job_id: &str,
        backlog: usize,
        token: &CancellationToken,
        mut on_line: F,
    ) -> Result<FollowSummary>
    where
        F: FnMut(&str),
    {
        let path = self.log_path(job_id)?;
        let mut summary = FollowSummary::default();

        if !self.wait_for_file(&path, token).await? {
            return Ok(summary);
        }

        let mut cursor = LogCursor::default();
        let backlog_lines = cursor.poll(&path).await?;
        let start = backlog_lines.len().saturating_sub(backlog);
        for line in &backlog_lines[start..] {
            on_line(line.as_str());
            summary.lines += 1;
        }

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            for line in cursor.poll(&path).await? {
                on_line(line.as_str());
                summary.lines += 1;
            }
        }

        debug!("Stopped following {} after {} line(s)", path.display(), summary.lines);
        Ok(summary)
    }

    /// Polls until `path` exists; false if cancelled first
    async fn wait_for_file(&self, path: &Path, token: &CancellationToken) -> Result<bool> {
        let mut announced = false;
        loop {
            match tokio::fs::try_exists(path).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    return Err(TrackerError::io(
                        format!("failed to check {}", path.display()),
                        e,
                    ));
                }
            }
            if !announced {
                info!("Waiting for {} to be created", path.display());
                announced = true;
            }
            tokio::select! {
                _ = token.cancelled() => return Ok(false),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

/// Bytes kept from the end of what was read, to notice in-place rewrites
const SAMPLE_LEN: usize = 64;

/// Read position in a followed log
///
/// The file counts as rewritten when its identity changes, when it is
/// shorter than what was already read, or when the bytes just before the
/// read position no longer match what was read there.
#[derive(Default)]
struct LogCursor {
    identity: Option<(u64, u64)>,
    offset: u64,
    sample: Vec<u8>,
    lines: LineBuffer,
}

impl LogCursor {
    /// Complete lines added since the last poll
    async fn poll(&mut self, path: &Path) -> Result<Vec<String>> {
        let wrap = |e: std::io::Error| TrackerError::io(format!("failed to read {}", path.display()), e);

        let mut file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(wrap(e)),
        };
        let meta = file.metadata().await.map_err(wrap)?;
        let identity = file_identity(&meta);
        let len = meta.len();

        if self.offset > 0 && self.was_rewritten(&mut file, identity, len).await.map_err(wrap)? {
            info!("{} was rewritten, following from the start", path.display());
            *self = Self::default();
        }
        self.identity = identity;
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset)).await.map_err(wrap)?;
        let mut chunk = Vec::new();
        file.read_to_end(&mut chunk).await.map_err(wrap)?;

        self.offset += chunk.len() as u64;
        self.sample.extend_from_slice(&chunk);
        let excess = self.sample.len().saturating_sub(SAMPLE_LEN);
        self.sample.drain(..excess);

        Ok(self.lines.push(&chunk))
    }

    async fn was_rewritten(
        &self,
        file: &mut tokio::fs::File,
        identity: Option<(u64, u64)>,
        len: u64,
    ) -> std::io::Result<bool> {
        if identity != self.identity || len < self.offset {
            return Ok(true);
        }

        let mut current = vec![0; self.sample.len()];
        file.seek(SeekFrom::Start(self.offset - self.sample.len() as u64))
            .await?;
        match file.read_exact(&mut current).await {
            Ok(_) => Ok(current != self.sample),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(true),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &std::fs::Metadata) -> Option<(u64, u64)> {
    None
}

/// Splits a byte stream into complete lines, holding back a partial one
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        String::from_utf8_lossy(&complete)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

async fn read_lossy(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TrackerError::io(format!("failed to read {}", path.display()), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::FileRecordStore;
    use crate::test_support::record;
    use std::io::Write;
    use tempfile::TempDir;

    fn service(tmp: &TempDir, log: &Path) -> LogService {
        let store = FileRecordStore::new(tmp.path().join("tracking"));
        let mut job = record("42", "train", "t1");
        job.log_file_path = log.display().to_string();
        store.put(&job).unwrap();
        LogService::new(Arc::new(store), Duration::from_millis(20))
    }

    #[test]
    fn test_line_buffer_holds_partial_lines() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"par").is_empty());
        assert_eq!(buffer.push(b"tial\nnext"), vec!["partial"]);
        assert_eq!(buffer.push(b"\r\n"), vec!["next"]);
    }

    #[tokio::test]
    async fn test_show_missing_log_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("train_t1_42.out");
        let service = service(&tmp, &log);

        assert_eq!(
            service.show("42").await.unwrap(),
            LogContent::NotYetCreated(log.clone())
        );
        assert_eq!(
            service.tail("42", 5).await.unwrap(),
            LogContent::NotYetCreated(log)
        );
    }

    #[tokio::test]
    async fn test_show_unknown_job() {
        let tmp = TempDir::new().unwrap();
        let service = service(&tmp, &tmp.path().join("x.out"));
        assert!(service.show("7").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_tail_last_lines_in_order() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("train_t1_42.out");
        let text: String = (1..=100).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&log, text).unwrap();
        let service = service(&tmp, &log);

        let LogContent::Available { content, .. } = service.tail("42", 10).await.unwrap() else {
            panic!("log should exist");
        };
        let expected: Vec<String> = (91..=100).map(|i| format!("line {i}")).collect();
        assert_eq!(content, expected);

        let LogContent::Available { content, .. } = service.tail("42", 500).await.unwrap() else {
            panic!("log should exist");
        };
        assert_eq!(content.len(), 100);
    }

    #[tokio::test]
    async fn test_follow_cancelled_while_waiting() {
        let tmp = TempDir::new().unwrap();
        let service = service(&tmp, &tmp.path().join("never.out"));
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            canceller.cancel();
        });

        let summary = tokio::time::timeout(
            Duration::from_secs(2),
            service.follow("42", 10, &token, |_| {}),
        )
        .await
        .expect("follow should stop on cancellation")
        .unwrap();
        assert_eq!(summary.lines, 0);
    }

    #[tokio::test]
    async fn test_follow_streams_appended_lines_and_restarts_on_truncation() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("train_t1_42.out");
        std::fs::write(&log, "old 1\nold 2\nold 3\n").unwrap();
        let service = service(&tmp, &log);
        let token = CancellationToken::new();

        let writer_log = log.clone();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&writer_log)
                .unwrap();
            file.write_all(b"new 1\nnew").unwrap();
            tokio::time::sleep(Duration::from_millis(60)).await;
            file.write_all(b" 2\n").unwrap();
            tokio::time::sleep(Duration::from_millis(60)).await;
            std::fs::write(&writer_log, "again\n").unwrap();
            tokio::time::sleep(Duration::from_millis(80)).await;
            canceller.cancel();
        });

        let mut seen = Vec::new();
        let summary = service
            .follow("42", 2, &token, |line| seen.push(line.to_string()))
            .await
            .unwrap();

        assert_eq!(seen, ["old 2", "old 3", "new 1", "new 2", "again"]);
        assert_eq!(summary.lines, 5);
    }

    async fn follow_through_rewrite(rewrite: impl FnOnce(&Path) + Send + 'static) -> Vec<String> {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("train_t1_42.out");
        std::fs::write(&log, "old 1\nold 2\n").unwrap();
        let service = service(&tmp, &log);
        let token = CancellationToken::new();

        let writer_log = log.clone();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            rewrite(&writer_log);
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let mut seen = Vec::new();
        service
            .follow("42", 10, &token, |line| seen.push(line.to_string()))
            .await
            .unwrap();
        seen
    }

    #[tokio::test]
    async fn test_follow_restarts_when_log_is_rewritten_longer_in_place() {
        let seen = follow_through_rewrite(|log| {
            std::fs::write(log, "new 1\nnew 2\nnew 3\n").unwrap();
        })
        .await;
        assert_eq!(seen, ["old 1", "old 2", "new 1", "new 2", "new 3"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_follow_restarts_when_log_is_replaced() {
        let seen = follow_through_rewrite(|log| {
            let staged = log.with_extension("staged");
            std::fs::write(&staged, "old 1\nold 2\nnew 3\n").unwrap();
            std::fs::rename(&staged, log).unwrap();
        })
        .await;
        assert_eq!(seen, ["old 1", "old 2", "old 1", "old 2", "new 3"]);
    }
}
