//! Job state for one pending transcription file.
//!
//! A Job is created when a file shows up in the pending directory and is
//! owned by the orchestrator for exactly one processing cycle.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::emotion::EmotionData;

/// Identifier of a job: the file name inside the pending directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self(file_name.into())
    }

    /// Derive the id from a path's file name
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| Self(n.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a job
///
/// Pending → Read → Classified → Responded → Archived, with Failed reachable
/// from any non-terminal state. A failed job's file stays where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Read,
    Classified,
    Responded,
    Archived,
    Failed,
}

impl JobStatus {
    /// Whether a transition from `self` to `next` follows the lifecycle
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Read)
                | (Read, Classified)
                | (Classified, Responded)
                | (Responded, Archived)
                // Empty payloads skip the stages entirely
                | (Read, Archived)
                | (Pending | Read | Classified | Responded, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Read => "read",
            JobStatus::Classified => "classified",
            JobStatus::Responded => "responded",
            JobStatus::Archived => "archived",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Final generated text for a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult(String);

impl PipelineResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of work: one text file in the pending directory
#[derive(Debug, Clone)]
pub struct Job {
    /// File name, unique within the pending directory
    pub id: JobId,

    /// Where the file sits while pending
    pub origin_path: PathBuf,

    /// Raw text content (empty until loaded)
    pub payload: String,

    /// Current lifecycle state
    pub status: JobStatus,

    /// Classification result, attached after the classify stage
    pub emotion: Option<EmotionData>,

    /// Generated response, attached after the generate stage
    pub response: Option<PipelineResult>,

    /// When the orchestrator picked the file up
    pub detected_at: DateTime<Utc>,
}

impl Job {
    /// Create a pending job for a file in the pending directory
    pub fn pending(id: JobId, origin_path: PathBuf) -> Self {
        Self {
            id,
            origin_path,
            payload: String::new(),
            status: JobStatus::Pending,
            emotion: None,
            response: None,
            detected_at: Utc::now(),
        }
    }

    /// Move to `next`, ignoring transitions the lifecycle doesn't allow
    ///
    /// Returns whether the transition happened.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            tracing::debug!(job = %self.id, from = %self.status, to = %next, "Ignoring invalid job transition");
            false
        }
    }

    /// Attach loaded content
    pub fn mark_read(&mut self, payload: String) {
        self.payload = payload;
        self.advance(JobStatus::Read);
    }

    /// Attach classification output
    pub fn mark_classified(&mut self, emotion: EmotionData) {
        self.emotion = Some(emotion);
        self.advance(JobStatus::Classified);
    }

    /// Attach the generated response
    pub fn mark_responded(&mut self, response: PipelineResult) {
        self.response = Some(response);
        self.advance(JobStatus::Responded);
    }

    pub fn mark_failed(&mut self) {
        self.advance(JobStatus::Failed);
    }

    /// True when the payload is empty or only whitespace
    pub fn is_empty_payload(&self) -> bool {
        self.payload.trim().is_empty()
    }
}

/// How a processed job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Fully processed, response emitted, file archived
    Archived(PipelineResult),

    /// Empty or whitespace-only payload, archived without stage calls
    SkippedEmpty,

    /// Moved to the dead-letter directory after too many failures
    DeadLettered { attempts: u32 },
}

/// Result of a single polling iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was pending
    Idle,

    /// One job was taken through the pipeline
    Finished { job: JobId, outcome: JobOutcome },
}
