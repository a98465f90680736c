//! Directory-backed job queue.
//!
//! The pending directory is the queue: every matching file is one job that
//! hasn't been processed yet. Moving a file into the archive directory is the
//! only completion record. There is no separate ledger.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use glob::Pattern;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::paths;
use crate::domain::{Job, JobId, JobStatus};

/// Errors that can occur with the job queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Queue is locked by another orchestrator: {0}")]
    Locked(PathBuf),

    #[error("Invalid job pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Job file is not valid UTF-8: {0}")]
    NotUtf8(PathBuf),
}

impl QueueError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Pending/archive directory pair acting as a single-consumer queue
#[derive(Debug, Clone)]
pub struct JobQueue {
    /// Directory producers write job files into
    pending_dir: PathBuf,

    /// Directory processed files are moved to
    archive_dir: PathBuf,

    /// Directory for jobs that exhausted their failure budget
    dead_letter_dir: PathBuf,

    /// File name filter for jobs
    pattern: Pattern,
}

impl JobQueue {
    /// Open a queue, creating the pending and archive directories
    pub async fn open(
        pending_dir: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
        pattern: &str,
    ) -> Result<Self, QueueError> {
        let pending_dir = pending_dir.into();
        let archive_dir = archive_dir.into();

        let pattern = Pattern::new(pattern).map_err(|source| QueueError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        fs::create_dir_all(&pending_dir)
            .await
            .map_err(|e| QueueError::io(&pending_dir, e))?;
        fs::create_dir_all(&archive_dir)
            .await
            .map_err(|e| QueueError::io(&archive_dir, e))?;

        Ok(Self {
            dead_letter_dir: paths::dead_letter_dir(&pending_dir),
            pending_dir,
            archive_dir,
            pattern,
        })
    }

    /// Open a queue from resolved configuration
    pub async fn from_config(config: &crate::config::ResolvedConfig) -> Result<Self, QueueError> {
        Self::open(&config.pending_dir, &config.archive_dir, &config.job_pattern).await
    }

    pub fn pending_dir(&self) -> &Path {
        &self.pending_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn dead_letter_dir(&self) -> &Path {
        &self.dead_letter_dir
    }

    /// Take the single-consumer lock on this queue
    ///
    /// The lock is held until the returned guard is dropped. A second
    /// orchestrator on the same pending dir gets `QueueError::Locked`.
    pub fn lock(&self) -> Result<QueueLock, QueueError> {
        let lock_path = paths::lock_file(&self.pending_dir);
        let file = File::create(&lock_path).map_err(|e| QueueError::io(&lock_path, e))?;

        file.try_lock_exclusive()
            .map_err(|_| QueueError::Locked(lock_path.clone()))?;

        Ok(QueueLock {
            file,
            path: lock_path,
        })
    }

    /// Check whether a file name is a job file
    ///
    /// Hidden files (including producers' in-progress `.part` files) never
    /// count, whatever the pattern says.
    pub fn is_job_file(&self, file_name: &str) -> bool {
        !file_name.starts_with('.') && self.pattern.matches(file_name)
    }

    /// List pending job files, sorted by file name
    pub async fn list_pending(&self) -> Result<Vec<PathBuf>, QueueError> {
        list_matching(&self.pending_dir, |name| self.is_job_file(name)).await
    }

    /// Select the next job, if any
    ///
    /// Takes the first entry of the sorted listing, so the choice is stable
    /// for a given directory content.
    pub async fn next_job(&self) -> Result<Option<Job>, QueueError> {
        let pending = self.list_pending().await?;

        Ok(pending.into_iter().find_map(|path| {
            let id = JobId::from_path(&path)?;
            Some(Job::pending(id, path))
        }))
    }

    /// Read the job's file into its payload
    pub async fn load(&self, job: &mut Job) -> Result<(), QueueError> {
        let bytes = fs::read(&job.origin_path)
            .await
            .map_err(|e| QueueError::io(&job.origin_path, e))?;

        let text = String::from_utf8(bytes)
            .map_err(|_| QueueError::NotUtf8(job.origin_path.clone()))?;

        job.mark_read(text);
        Ok(())
    }

    /// Move the job's file into the archive directory under its own name
    pub async fn archive(&self, job: &mut Job) -> Result<PathBuf, QueueError> {
        let target = self.archive_dir.join(job.id.as_str());
        move_file(&job.origin_path, &target).await?;

        job.advance(JobStatus::Archived);
        tracing::debug!(job = %job.id, target = %target.display(), "Archived job file");

        Ok(target)
    }

    /// Move the job's file into the dead-letter directory
    ///
    /// The job keeps its Failed status; only the file moves.
    pub async fn dead_letter(&self, job: &mut Job) -> Result<PathBuf, QueueError> {
        fs::create_dir_all(&self.dead_letter_dir)
            .await
            .map_err(|e| QueueError::io(&self.dead_letter_dir, e))?;

        let target = self.dead_letter_dir.join(job.id.as_str());
        move_file(&job.origin_path, &target).await?;

        Ok(target)
    }

    /// Write a new text job into the pending directory
    ///
    /// The content goes to a hidden `.part` file first and is renamed into
    /// place, so the orchestrator never sees a half-written job.
    pub async fn enqueue_text(&self, text: &str) -> Result<PathBuf, QueueError> {
        let name = job_file_name(Utc::now());
        self.enqueue_named(&name, text).await
    }

    /// Write a text job under a specific file name
    pub async fn enqueue_named(&self, file_name: &str, text: &str) -> Result<PathBuf, QueueError> {
        let part = paths::part_file(&self.pending_dir, file_name);
        let target = self.pending_dir.join(file_name);

        let mut file = fs::File::create(&part)
            .await
            .map_err(|e| QueueError::io(&part, e))?;
        file.write_all(text.as_bytes())
            .await
            .map_err(|e| QueueError::io(&part, e))?;
        file.sync_all()
            .await
            .map_err(|e| QueueError::io(&part, e))?;
        drop(file);

        fs::rename(&part, &target)
            .await
            .map_err(|e| QueueError::io(&target, e))?;

        Ok(target)
    }

    /// Count files in each queue state
    pub async fn status(&self) -> Result<QueueStatus, QueueError> {
        let pending = self.list_pending().await?;
        let archived = list_matching(&self.archive_dir, |name| self.is_job_file(name)).await?;
        let dead_lettered = if self.dead_letter_dir.exists() {
            list_matching(&self.dead_letter_dir, |name| self.is_job_file(name)).await?
        } else {
            Vec::new()
        };

        Ok(QueueStatus {
            pending: pending
                .iter()
                .filter_map(|p| JobId::from_path(p))
                .collect(),
            archived: archived.len(),
            dead_lettered: dead_lettered.len(),
        })
    }
}

/// Exclusive lock on a queue; released on drop
#[derive(Debug)]
pub struct QueueLock {
    file: File,
    path: PathBuf,
}

impl QueueLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for QueueLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Queue status summary
#[derive(Debug, Clone, Default)]
pub struct QueueStatus {
    pub pending: Vec<JobId>,
    pub archived: usize,
    pub dead_lettered: usize,
}

impl QueueStatus {
    /// Total files the queue knows about
    pub fn total(&self) -> usize {
        self.pending.len() + self.archived + self.dead_lettered
    }
}

/// File name for a new job: `transcription_<YYYYmmdd_HHMMSS>_<8 hex>.txt`
///
/// The random suffix keeps two jobs written in the same second apart.
pub fn job_file_name(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "transcription_{}_{}.txt",
        at.format("%Y%m%d_%H%M%S"),
        &suffix[..8]
    )
}

/// SHA256 of a payload (first 16 hex chars)
pub fn payload_digest(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// List regular files directly under `dir` whose names pass `filter`
async fn list_matching(
    dir: &Path,
    filter: impl Fn(&str) -> bool,
) -> Result<Vec<PathBuf>, QueueError> {
    let mut entries = fs::read_dir(dir).await.map_err(|e| QueueError::io(dir, e))?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(|e| QueueError::io(dir, e))? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        if !filter(name) {
            continue;
        }

        // Entry may vanish between listing and stat; skip it then
        match entry.file_type().await {
            Ok(ft) if ft.is_file() => files.push(entry.path()),
            _ => continue,
        }
    }

    files.sort();
    Ok(files)
}

/// Move a file, falling back to copy + remove across filesystems
async fn move_file(from: &Path, to: &Path) -> Result<(), QueueError> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            // Source gone: nothing to fall back to
            if !from.exists() {
                return Err(QueueError::io(from, rename_err));
            }

            tracing::debug!(
                from = %from.display(),
                to = %to.display(),
                error = %rename_err,
                "Rename failed, copying instead"
            );

            fs::copy(from, to).await.map_err(|e| QueueError::io(to, e))?;
            if let Err(e) = fs::remove_file(from).await {
                // The file must end up in exactly one place
                if let Err(cleanup) = fs::remove_file(to).await {
                    tracing::warn!(
                        target_path = %to.display(),
                        error = %cleanup,
                        "Failed to remove copy after aborted move"
                    );
                }
                return Err(QueueError::io(from, e));
            }
            Ok(())
        }
    }
}
