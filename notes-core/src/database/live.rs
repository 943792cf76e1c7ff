//! Live query plumbing
//!
//! Writes publish the tables they touched after commit. A [`LiveQuery`]
//! re-runs its query whenever a change touches one of its watched tables
//! and delivers each full result set over its own channel.

use crate::config::LIVE_QUERY_BUFFER;
use crate::error::Result;
use std::future::Future;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Tables a live query can depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Notes,
    Tags,
    NoteTagCrossRef,
}

/// Notification published after a write commits
#[derive(Debug, Clone, Copy)]
pub struct TableChange(pub &'static [Table]);

impl TableChange {
    pub fn touches(&self, watched: &[Table]) -> bool {
        self.0.iter().any(|t| watched.contains(t))
    }
}

/// A continuously updated query result.
///
/// Yields an initial result set, then a fresh one after every relevant
/// committed change. Dropping the handle stops the background refresh and
/// discards anything still buffered. Creating one spawns a tokio task, so
/// it must happen inside a tokio runtime.
pub struct LiveQuery<T> {
    rx: mpsc::Receiver<Result<Vec<T>>>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> LiveQuery<T> {
    /// Spawn a refresh task for `query`, watching `tables` on `changes`.
    ///
    /// The change subscription is taken before the first read so no commit
    /// between the initial read and the first notification is missed.
    /// Panics outside a tokio runtime, like `tokio::spawn`.
    pub(crate) fn spawn<F, Fut>(
        changes: &broadcast::Sender<TableChange>,
        tables: &'static [Table],
        query: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        let mut change_rx = changes.subscribe();
        let (tx, rx) = mpsc::channel(LIVE_QUERY_BUFFER);

        let task = tokio::spawn(async move {
            if tx.send(query().await).await.is_err() {
                return;
            }

            loop {
                match change_rx.recv().await {
                    Ok(change) if !change.touches(tables) => continue,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Live query lagged behind changes, refreshing");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                let result = query().await;
                if let Err(e) = &result {
                    tracing::warn!("Live query refresh failed: {}", e);
                }
                if tx.send(result).await.is_err() {
                    break;
                }
            }
        });

        Self { rx, task }
    }

    /// Wait for the next result set. `None` once the store has shut down.
    pub async fn next(&mut self) -> Option<Result<Vec<T>>> {
        self.rx.recv().await
    }

    /// Stop receiving updates
    pub fn cancel(self) {
        drop(self);
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
