// Tracked fire-and-forget cache writes
// Author: kelexine (https://github.com/kelexine)

use parking_lot::Mutex;
use std::future::Future;
use tokio::task::JoinSet;
use tracing::warn;

/// Background writes that the caller does not wait for but that are never
/// silently dropped: every scheduled write runs to completion unless the set
/// itself is dropped, and [`WriteBehind::drain`] waits for all of them.
#[derive(Default)]
pub struct WriteBehind {
    tasks: Mutex<JoinSet<()>>,
}

impl WriteBehind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `write` on the current runtime.
    pub fn schedule<F>(&self, write: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        // Reap whatever already finished so the set does not grow unbounded
        while tasks.try_join_next().is_some() {}
        tasks.spawn(write);
    }

    /// Number of writes not yet reaped.
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Wait until every scheduled write, including ones scheduled meanwhile, finished.
    pub async fn drain(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.tasks.lock());
            if batch.is_empty() {
                return;
            }
            while let Some(result) = batch.join_next().await {
                if let Err(e) = result {
                    warn!("Background cache write did not complete: {}", e);
                }
            }
        }
    }
}
