//! Keyed, cancellable delayed tasks.
//!
//! `KeyedScheduler::schedule` arms a one-shot task per key. Scheduling the
//! same key again before the delay elapses aborts the pending task and
//! restarts the delay, which is how the summary cache debounces
//! recomputation.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::AbortHandle;

struct Scheduled {
    generation: u64,
    handle: AbortHandle,
}

/// One pending delayed task per key.
pub struct KeyedScheduler<K: Eq + Hash> {
    tasks: Arc<DashMap<K, Scheduled>>,
    next_generation: AtomicU64,
}

impl<K> KeyedScheduler<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Run `task` after `delay`, replacing any task still pending for `key`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);
        let task_key = key.clone();

        // The shard lock is held until the new entry is in place, so the
        // spawned task cannot look for its entry before it exists.
        let entry = self.tasks.entry(key);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let fired = tasks
                .remove_if(&task_key, |_, s| s.generation == generation)
                .is_some();
            if fired {
                task.await;
            }
        })
        .abort_handle();

        let scheduled = Scheduled { generation, handle };
        match entry {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(scheduled);
                previous.handle.abort();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(scheduled);
            }
        }
    }

    /// Abort the pending task for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match self.tasks.remove(key) {
            Some((_, scheduled)) => {
                scheduled.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Whether a task for `key` is armed and has not fired yet.
    pub fn is_pending(&self, key: &K) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn cancel_all(&self) {
        self.tasks.retain(|_, scheduled| {
            scheduled.handle.abort();
            false
        });
    }
}

impl<K> Default for KeyedScheduler<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> Drop for KeyedScheduler<K> {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().handle.abort();
        }
    }
}
