//! Record repository
//!
//! One `<job_id>.meta` file per job inside the tracking directory. Records
//! are written whole to a temporary file and hard-linked into place, so a
//! concurrent reader never observes a partial record and an existing record
//! is never overwritten.

use batchtrack_core::domain::job::JobRecord;
use batchtrack_core::meta::{self, META_EXTENSION};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, TrackerError};

/// A stored record as seen on disk, without decoding it
#[derive(Debug, Clone)]
pub struct RecordEntry {
    pub job_id: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Lazy pass over every stored record
///
/// Call [`RecordStore::scan`] again to restart. Order is whatever the
/// backing store yields.
pub type RecordScan<'a> = Box<dyn Iterator<Item = Result<JobRecord>> + Send + 'a>;

/// Durable per-job metadata, keyed by job id
pub trait RecordStore: Send + Sync {
    /// Persists a new record, failing with `DuplicateKey` if one exists
    fn put(&self, record: &JobRecord) -> Result<()>;

    /// Fetches a record, failing with `NotFound` if absent
    fn get(&self, job_id: &str) -> Result<JobRecord>;

    /// Iterates every record; unreadable ones surface as `Err` items
    fn scan(&self) -> Result<RecordScan<'_>>;

    /// Lists stored records with their modification times
    fn entries(&self) -> Result<Vec<RecordEntry>>;

    /// Removes a record; returns whether one existed
    fn delete(&self, job_id: &str) -> Result<bool>;
}

/// [`RecordStore`] backed by a directory of `.meta` files
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    dir: PathBuf,
}

impl FileRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `job_id`, if the id is usable as a file name
    fn path_for(&self, job_id: &str) -> Option<PathBuf> {
        let usable = !job_id.is_empty()
            && !job_id.starts_with('.')
            && !job_id.contains(['/', '\\', '\0']);

        usable.then(|| self.dir.join(format!("{}.{}", job_id, META_EXTENSION)))
    }

    /// Job id encoded in a directory entry name, if it names a record
    fn job_id_of(path: &Path) -> Option<String> {
        if path.extension()? != META_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        (!stem.is_empty() && !stem.starts_with('.')).then(|| stem.to_string())
    }

    fn read_record(path: &Path, expected_id: &str) -> Result<JobRecord> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TrackerError::NotFound(expected_id.to_string()),
            _ => TrackerError::io(format!("failed to read {}", path.display()), e),
        })?;

        let record = meta::decode(&text).map_err(|source| TrackerError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

        if record.job_id != expected_id {
            warn!(
                "Record {} declares JOB_ID={}, using the file name",
                path.display(),
                record.job_id
            );
            return Ok(JobRecord {
                job_id: expected_id.to_string(),
                ..record
            });
        }

        Ok(record)
    }

    /// Paths of every record file; an absent directory holds no records
    fn record_paths(&self) -> Result<Vec<(String, PathBuf)>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(TrackerError::io(
                    format!("failed to list {}", self.dir.display()),
                    e,
                ));
            }
        };

        let mut paths = Vec::new();
        for entry in read_dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", self.dir.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if let Some(job_id) = Self::job_id_of(&path) {
                paths.push((job_id, path));
            }
        }
        Ok(paths)
    }

    fn write_temp(&self, job_id: &str, contents: &str) -> std::io::Result<PathBuf> {
        let tmp = self.dir.join(format!(".{}.{}.tmp", job_id, Uuid::new_v4()));
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        Ok(tmp)
    }

    /// Moves `tmp` to `target` unless `target` already exists
    fn publish(tmp: &Path, target: &Path) -> std::io::Result<bool> {
        match fs::hard_link(tmp, target) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => {
                // Filesystems without hard links: check then rename
                debug!("hard link unavailable ({}), falling back to rename", e);
                if target.exists() {
                    return Ok(false);
                }
                fs::rename(tmp, target)?;
                Ok(true)
            }
        }
    }
}

impl RecordStore for FileRecordStore {
    fn put(&self, record: &JobRecord) -> Result<()> {
        let target = self.path_for(&record.job_id).ok_or_else(|| {
            TrackerError::InvalidSpec(format!("unusable job id '{}'", record.job_id))
        })?;

        fs::create_dir_all(&self.dir).map_err(|e| {
            TrackerError::io(format!("failed to create {}", self.dir.display()), e)
        })?;

        let tmp = self
            .write_temp(&record.job_id, &meta::encode(record))
            .map_err(|e| TrackerError::io("failed to write record", e))?;

        let published = Self::publish(&tmp, &target);
        if tmp.exists() {
            if let Err(e) = fs::remove_file(&tmp) {
                warn!("Failed to remove temporary file {}: {}", tmp.display(), e);
            }
        }

        match published {
            Ok(true) => {
                debug!("Stored record {}", target.display());
                Ok(())
            }
            Ok(false) => Err(TrackerError::DuplicateKey(record.job_id.clone())),
            Err(e) => Err(TrackerError::io(
                format!("failed to publish {}", target.display()),
                e,
            )),
        }
    }

    fn get(&self, job_id: &str) -> Result<JobRecord> {
        let path = self
            .path_for(job_id)
            .ok_or_else(|| TrackerError::NotFound(job_id.to_string()))?;
        Self::read_record(&path, job_id)
    }

    fn scan(&self) -> Result<RecordScan<'_>> {
        let paths = self.record_paths()?;
        Ok(Box::new(paths.into_iter().filter_map(|(job_id, path)| {
            match Self::read_record(&path, &job_id) {
                // Removed between listing and reading
                Err(TrackerError::NotFound(_)) => None,
                other => Some(other),
            }
        })))
    }

    fn entries(&self) -> Result<Vec<RecordEntry>> {
        let mut entries = Vec::new();
        for (job_id, path) in self.record_paths()? {
            match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified) => entries.push(RecordEntry {
                    job_id,
                    path,
                    modified,
                }),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Skipping {}: cannot read mtime: {}", path.display(), e),
            }
        }
        Ok(entries)
    }

    fn delete(&self, job_id: &str) -> Result<bool> {
        let Some(path) = self.path_for(job_id) else {
            return Ok(false);
        };

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TrackerError::io(
                format!("failed to delete {}", path.display()),
                e,
            )),
        }
    }
}
