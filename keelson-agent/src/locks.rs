use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-thread async mutexes. Entries are dropped once nobody holds or waits on them.
#[derive(Clone, Default)]
pub struct ThreadLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, thread_id: &str) -> ThreadGuard {
        let lock = self
            .inner
            .entry(thread_id.to_string())
            .or_default()
            .value()
            .clone();
        let guard = lock.lock_owned().await;
        ThreadGuard {
            guard: Some(guard),
            thread_id: thread_id.to_string(),
            locks: self.inner.clone(),
        }
    }

    /// Number of threads with a live lock entry.
    pub fn active(&self) -> usize {
        self.inner.len()
    }
}

pub struct ThreadGuard {
    guard: Option<OwnedMutexGuard<()>>,
    thread_id: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.thread_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
