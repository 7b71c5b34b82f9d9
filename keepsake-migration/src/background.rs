//! Running export/restore on a blocking worker.

use crate::error::{MigrationError, MigrationResult};
use crate::progress::Progress;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A migration operation running on `spawn_blocking`.
///
/// Progress arrives on [`progress`](Self::progress) until the worker
/// finishes; the channel then closes.
pub struct BackgroundTask<T> {
    progress: mpsc::UnboundedReceiver<Progress>,
    handle: JoinHandle<MigrationResult<T>>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn<F>(job: F) -> Self
    where
        F: FnOnce(&mut dyn FnMut(Progress)) -> MigrationResult<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::task::spawn_blocking(move || {
            let mut forward = |p: Progress| {
                // Receiver dropped means nobody is watching; keep working.
                let _ = tx.send(p);
            };
            job(&mut forward)
        });
        Self {
            progress: rx,
            handle,
        }
    }

    pub fn progress(&mut self) -> &mut mpsc::UnboundedReceiver<Progress> {
        &mut self.progress
    }

    /// Waits for the worker and returns its result.
    pub async fn join(self) -> MigrationResult<T> {
        self.handle
            .await
            .map_err(|e| MigrationError::Worker(e.to_string()))?
    }
}
