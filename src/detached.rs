//! Fire-and-forget writes that can still be awaited at shutdown.
//!
//! Request paths spawn history and cache writes without waiting for them.
//! A short-lived process (one CLI command) calls [`DetachedWrites::flush`]
//! before exiting so those writes are not cancelled with the runtime.

use parking_lot::Mutex;
use std::future::Future;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct DetachedWrites {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DetachedWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, write: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(write);
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Wait for every write spawned so far.
    pub async fn flush(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "detached write panicked");
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }
}
