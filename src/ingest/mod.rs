//! Job ingestion: the pending-directory queue and its producers.
//!
//! The pipeline:
//!
//! 1. **Transcriber**: Whisper turns audio into a `.txt` job file
//! 2. **Queue**: the pending directory, one file per job, archived on success
//! 3. **Watcher**: optional change notifications to cut idle latency
//!
//! # Architecture
//!
//! ```text
//! audio → Transcriber → <pending>/*.txt → Orchestrator → <pending>/archive/
//!                             ↑
//!                        QueueWaker (notify)
//! ```

pub mod queue;
pub mod transcriber;
pub mod watcher;

// Re-export key types
pub use queue::{JobQueue, QueueError, QueueLock, QueueStatus};
pub use transcriber::{transcribe, transcribe_to_queue, TranscriptResult};
pub use watcher::{QueueWaker, WatcherError};
