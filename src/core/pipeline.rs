//! Stage definitions and per-job failure types.
//!
//! Every job goes through the same fixed sequence:
//! Load → Classify → Generate → Emit → Archive.
//! An empty payload short-circuits from Load straight to Archive.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::domain::JobId;
use crate::ingest::QueueError;

/// One step of the per-job pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Listing the pending directory and selecting a job
    Poll,
    /// Reading the job file
    Load,
    /// Emotion classification
    Classify,
    /// Retrieval + generation
    Generate,
    /// Delivering the response to the output sink
    Emit,
    /// Moving the file out of the pending directory
    Archive,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Poll => "poll",
            Stage::Load => "load",
            Stage::Classify => "classify",
            Stage::Generate => "generate",
            Stage::Emit => "emit",
            Stage::Archive => "archive",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage failed
#[derive(Debug, Error)]
pub enum StageError {
    /// A collaborator returned an error
    #[error("{stage} failed: {error:#}")]
    Collaborator { stage: Stage, error: anyhow::Error },

    /// A collaborator didn't answer within the stage deadline
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    /// Reading, listing or moving files failed
    #[error("{stage} failed: {source}")]
    Filesystem {
        stage: Stage,
        #[source]
        source: QueueError,
    },
}

impl StageError {
    pub fn filesystem(stage: Stage, source: QueueError) -> Self {
        Self::Filesystem { stage, source }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Collaborator { stage, .. }
            | Self::Timeout { stage, .. }
            | Self::Filesystem { stage, .. } => *stage,
        }
    }
}

/// A failed polling iteration
///
/// The job (if one was selected) stays in the pending directory and will be
/// picked up again on a later poll.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PollError {
    /// The job that failed, if the failure happened after selection
    pub job: Option<JobId>,

    /// Consecutive failures recorded for this job (0 if no job)
    pub attempts: u32,

    #[source]
    pub error: StageError,
}
