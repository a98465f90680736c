//! Core orchestration logic.
//!
//! This module contains:
//! - Pipeline: stage sequence and per-job failure types
//! - Orchestrator: the polling loop that drives jobs through the stages

pub mod orchestrator;
pub mod pipeline;

// Re-export commonly used types
pub use orchestrator::{LoopStats, Orchestrator};
pub use pipeline::{PollError, Stage, StageError};
