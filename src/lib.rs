//! empath - emotion-aware response pipeline over a directory queue
//!
//! A producer drops a transcription into the pending directory; the
//! orchestrator picks it up, classifies its emotion, generates a supportive
//! response with retrieval + a hosted language model, emits the response and
//! archives the file.
//!
//! # Architecture
//!
//! The pending directory *is* the queue:
//! - One `.txt` file per job; archival (a move) is the only completion record
//! - One job in flight at a time, at-least-once across restarts
//! - A failing job stays pending and is retried on a later poll
//!
//! # Modules
//!
//! - `adapters`: Collaborators (classifier, retrieval, Gemini, output sinks)
//! - `core`: Orchestration loop and stage error types
//! - `domain`: Data structures (Job, EmotionData, PipelineResult)
//! - `ingest`: Queue directory, Whisper producer, change watcher
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Queue a job
//! echo "I feel overwhelmed today." | empath submit
//!
//! # Process jobs until Ctrl+C
//! empath run
//!
//! # Check the queue
//! empath status
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;

// Re-export main types at crate root for convenience
pub use adapters::{EmotionClassifier, OutputSink, ResponseGenerator};
pub use core::{LoopStats, Orchestrator, PollError, Stage, StageError};
pub use domain::{EmotionData, Job, JobId, JobOutcome, JobStatus, PipelineResult, PollOutcome};
pub use ingest::{JobQueue, QueueError, QueueWaker};
