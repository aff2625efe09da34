//! Single-flight execution of submission cycles.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Runs spawned jobs strictly one after another.
///
/// Each job waits for the completion signal of the job spawned before it,
/// whatever that job's outcome. The signal is a `watch` channel whose
/// sender is dropped if the job panics, which also releases the waiter.
#[derive(Debug, Default)]
pub(crate) struct SingleFlight {
    last: Mutex<Option<watch::Receiver<bool>>>,
    pending: Arc<AtomicUsize>,
}

struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawns `job` to run once every previously spawned job has finished.
    pub(crate) fn spawn<F, T>(&self, job: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = watch::channel(false);
        let previous = self.last.lock().replace(done_rx);

        self.pending.fetch_add(1, Ordering::SeqCst);
        let guard = PendingGuard(Arc::clone(&self.pending));

        tokio::spawn(async move {
            let _guard = guard;
            if let Some(mut previous) = previous {
                // Err means the previous job's task is gone, which also ends it.
                let _ = previous.wait_for(|done| *done).await;
            }
            let output = job.await;
            let _ = done_tx.send(true);
            output
        })
    }

    /// Jobs spawned and not yet finished, waiting ones included.
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}
