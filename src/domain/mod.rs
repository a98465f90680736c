//! Domain types for the empath orchestrator.
//!
//! This module contains the core data structures:
//! - Job: one pending transcription and its lifecycle
//! - EmotionData: classifier output forwarded to generation
//! - PipelineResult: the final response text

pub mod emotion;
pub mod job;

// Re-export commonly used types
pub use emotion::{EmotionData, NEUTRAL};
pub use job::{Job, JobId, JobOutcome, JobStatus, PipelineResult, PollOutcome};
