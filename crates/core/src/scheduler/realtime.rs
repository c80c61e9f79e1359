//! Wall-clock scheduler backed by tokio timers.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{Callback, Scheduler, TaskId};

/// Scheduler running each task as a sleeping tokio task.
///
/// A task's callback runs only if the task is still registered when its
/// timer elapses, so `cancel` and `cancel_all` are exact for tasks that have
/// not started. A callback that is already executing is not interrupted.
pub struct TokioScheduler {
    /// Runtime the timer tasks are spawned on
    handle: Handle,
    /// Next task id
    next_id: AtomicU64,
    /// Pending tasks by id
    tasks: Arc<Mutex<HashMap<TaskId, JoinHandle<()>>>>,
}

impl TokioScheduler {
    /// Create a scheduler on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    /// Create a scheduler spawning onto the given runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(0),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of tasks waiting to fire.
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: Callback) -> TaskId {
        let id = TaskId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let tasks = Arc::clone(&self.tasks);

        // Hold the map while spawning so the timer cannot deregister an id
        // that has not been inserted yet.
        let mut pending = self.tasks.lock();
        let handle = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let still_pending = tasks.lock().remove(&id).is_some();
            if still_pending {
                callback();
            }
        });
        pending.insert(id, handle);

        id
    }

    fn cancel(&self, task: TaskId) {
        let handle = self.tasks.lock().remove(&task);
        if let Some(handle) = handle {
            handle.abort();
            debug!(task = ?task, "Cancelled scheduled task");
        }
    }

    fn cancel_all(&self) {
        let drained: Vec<_> = self.tasks.lock().drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Cancelling all scheduled tasks");
        }
        for (_, handle) in drained {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_callback(counter: &Arc<AtomicUsize>) -> Callback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_zero_delay_is_not_synchronous() {
        let scheduler = TokioScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(Duration::ZERO, counter_callback(&fired));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_cancel_prevents_callback() {
        let scheduler = TokioScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let task = scheduler.schedule(Duration::from_millis(10), counter_callback(&fired));
        scheduler.cancel(task);
        // Second cancel is a no-op
        scheduler.cancel(task);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let scheduler = TokioScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            scheduler.schedule(Duration::from_millis(10), counter_callback(&fired));
        }
        assert_eq!(scheduler.pending(), 5);

        scheduler.cancel_all();
        assert_eq!(scheduler.pending(), 0);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delay() {
        let scheduler = TokioScheduler::new();
        let start = std::time::Instant::now();

        scheduler.delay(Duration::from_millis(15)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
