//! Trailing-edge debouncer.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Runs only the last task scheduled within a quiet period.
///
/// Each [`schedule`](Debouncer::schedule) aborts the pending task, if any,
/// and starts a new timer. Must be used inside a tokio runtime.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedules `task` to run after the quiet period, superseding any task
    /// scheduled earlier that has not fired yet.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });

        match self.pending.lock() {
            Ok(mut pending) => {
                if let Some(previous) = pending.replace(handle) {
                    previous.abort();
                }
            }
            Err(_) => {
                tracing::warn!("[Debouncer] Pending task lock poisoned; task not tracked");
            }
        }
    }

    /// Drops the pending task without running it.
    pub fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(previous) = pending.take() {
                previous.abort();
            }
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
