//! Filesystem-notification waker for the pending directory.
//!
//! The orchestrator polls; this only shortens the idle wait when something
//! changes in the pending directory. Listing the directory stays the single
//! source of truth for what is pending, so a missed notification costs at
//! most one poll interval.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur with the waker
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Watch directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),
}

/// Debounce window for change notifications
const DEBOUNCE: Duration = Duration::from_millis(250);

/// Wakes the orchestrator's idle wait when the pending directory changes
pub struct QueueWaker {
    /// Receives one ping per debounced batch of events
    rx: mpsc::Receiver<()>,

    /// Keeps the OS watcher alive; dropping it stops notifications
    _debouncer: Debouncer<notify::RecommendedWatcher>,
}

impl QueueWaker {
    /// Start watching `dir` (non-recursive)
    pub fn watch(dir: &Path) -> Result<Self, WatcherError> {
        if !dir.is_dir() {
            return Err(WatcherError::DirectoryNotFound(dir.to_path_buf()));
        }

        // Capacity 1: pings coalesce, the orchestrator only needs to know
        // that *something* changed since its last look
        let (tx, rx) = mpsc::channel::<()>(1);

        let mut debouncer = new_debouncer(DEBOUNCE, move |result: DebounceEventResult| {
            match result {
                Ok(events) if !events.is_empty() => {
                    let _ = tx.try_send(());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Watcher error: {:?}", e),
            }
        })?;

        debouncer.watcher().watch(dir, RecursiveMode::NonRecursive)?;

        tracing::info!("Watching {} for new jobs", dir.display());

        Ok(Self {
            rx,
            _debouncer: debouncer,
        })
    }

    /// Wait until the directory changes
    ///
    /// Never resolves if the watcher has shut down, so it is safe to race
    /// against a timer in `select!`.
    pub async fn changed(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}
