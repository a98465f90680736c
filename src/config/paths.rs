//! Canonical paths for the empath job queue.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! ## Layout
//!
//! | Location | Owner | Purpose |
//! |----------|-------|---------|
//! | `<pending>/*.txt` | producers | One file per pending job |
//! | `<pending>/.*.part` | producers | In-progress writes, never selected |
//! | `<pending>/archive/` | orchestrator | Successfully processed jobs |
//! | `<pending>/failed/` | orchestrator | Dead-lettered jobs (opt-in) |
//! | `<pending>/.orchestrator.lock` | orchestrator | Single-consumer lock |

use std::path::{Path, PathBuf};

/// Subdirectory for processed jobs
pub const ARCHIVE_DIR_NAME: &str = "archive";

/// Subdirectory for jobs that exceeded their failure budget
pub const DEAD_LETTER_DIR_NAME: &str = "failed";

/// Lock file guarding against a second orchestrator on the same queue
pub const LOCK_FILE_NAME: &str = ".orchestrator.lock";

/// Suffix for files a producer is still writing
pub const PART_SUFFIX: &str = ".part";

/// Default archive directory for a pending directory
pub fn archive_dir(pending_dir: &Path) -> PathBuf {
    pending_dir.join(ARCHIVE_DIR_NAME)
}

/// Dead-letter directory for a pending directory
pub fn dead_letter_dir(pending_dir: &Path) -> PathBuf {
    pending_dir.join(DEAD_LETTER_DIR_NAME)
}

/// Lock file path for a pending directory
pub fn lock_file(pending_dir: &Path) -> PathBuf {
    pending_dir.join(LOCK_FILE_NAME)
}

/// Temporary path a producer writes to before renaming into place
pub fn part_file(pending_dir: &Path, final_name: &str) -> PathBuf {
    pending_dir.join(format!(".{}{}", final_name, PART_SUFFIX))
}

/// Default responses log, next to the pending directory
pub fn default_responses_log(pending_dir: &Path) -> PathBuf {
    pending_dir
        .parent()
        .unwrap_or(pending_dir)
        .join("responses.log")
}
