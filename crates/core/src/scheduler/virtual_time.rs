//! Deterministic scheduler driven by a simulated clock.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tracing::{error, trace};

use super::{Callback, Scheduler, TaskId};

/// Default granularity of [`VirtualScheduler::advance`].
pub const DEFAULT_STEP: Duration = Duration::from_millis(1);

/// Yields handed to the runtime after each step so that tasks woken by fired
/// callbacks run to their next suspension point.
const SETTLE_YIELDS: usize = 16;

/// Scheduler whose clock only moves when told to.
///
/// Callbacks fire from inside [`advance`](Self::advance), in due-time order
/// (ties in scheduling order). Tasks scheduled while advancing fire in the
/// same call if they fall due inside the window, including zero-delay tasks
/// scheduled at the final instant. Between steps the scheduler
/// yields to the runtime so that futures woken by a callback (a
/// [`Scheduler::delay`], a fetch completing) make progress before time moves
/// on; this is reliable on the current-thread runtime used by
/// `#[tokio::test]`.
pub struct VirtualScheduler {
    state: Mutex<VirtualState>,
}

struct VirtualState {
    /// Simulated current time
    now: Duration,
    /// Next task id
    next_id: u64,
    /// Pending callbacks ordered by due time, then id
    queue: BTreeMap<(Duration, TaskId), Callback>,
    /// Due time of each pending task
    due: HashMap<TaskId, Duration>,
}

impl VirtualScheduler {
    /// Create a scheduler with the clock at zero.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VirtualState {
                now: Duration::ZERO,
                next_id: 0,
                queue: BTreeMap::new(),
                due: HashMap::new(),
            }),
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Number of tasks waiting to fire.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Advance the clock by `by` in [`DEFAULT_STEP`] increments.
    pub async fn advance(&self, by: Duration) {
        self.advance_in_steps(by, DEFAULT_STEP).await
    }

    /// Advance the clock by `by`, firing due tasks after every `step`.
    ///
    /// A zero `step` advances the whole window at once.
    pub async fn advance_in_steps(&self, by: Duration, step: Duration) {
        let step = if step.is_zero() { by } else { step };

        // Let freshly spawned work register its timers at the current time.
        settle().await;
        let start = self.now();
        let target = start + by;
        self.run_due(start).await;

        loop {
            let now = {
                let mut state = self.state.lock();
                if state.now >= target {
                    break;
                }
                state.now = (state.now + step).min(target);
                state.now
            };
            self.run_due(now).await;
        }
    }

    /// Fire due tasks and let their continuations run until nothing more is
    /// due at `now`.
    async fn run_due(&self, now: Duration) {
        loop {
            self.fire_due(now);
            settle().await;
            let more_due = matches!(
                self.state.lock().queue.first_key_value(),
                Some((&(due, _), _)) if due <= now
            );
            if !more_due {
                break;
            }
        }
    }

    /// Fire every task due at or before `now`, including ones scheduled by
    /// the callbacks themselves.
    fn fire_due(&self, now: Duration) {
        loop {
            let next = {
                let mut state = self.state.lock();
                match state.queue.first_key_value() {
                    Some((&(due, id), _)) if due <= now => {
                        state.due.remove(&id);
                        state.queue.remove(&(due, id)).map(|callback| (id, callback))
                    }
                    _ => None,
                }
            };
            let Some((id, callback)) = next else {
                break;
            };

            trace!(task = ?id, now_ms = now.as_millis() as u64, "Firing virtual task");
            if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                error!(task = ?id, "Scheduled callback panicked");
            }
        }
    }
}

impl Default for VirtualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule(&self, delay: Duration, callback: Callback) -> TaskId {
        let mut state = self.state.lock();
        let id = TaskId::new(state.next_id);
        state.next_id += 1;
        let due = state.now + delay;
        state.queue.insert((due, id), callback);
        state.due.insert(id, due);
        id
    }

    fn cancel(&self, task: TaskId) {
        let callback = {
            let mut state = self.state.lock();
            state
                .due
                .remove(&task)
                .and_then(|due| state.queue.remove(&(due, task)))
        };
        // Dropped outside the lock: dropping a callback may wake a delay.
        drop(callback);
    }

    fn cancel_all(&self) {
        let callbacks = {
            let mut state = self.state.lock();
            state.due.clear();
            std::mem::take(&mut state.queue)
        };
        drop(callbacks);
    }
}

impl std::fmt::Debug for VirtualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("VirtualScheduler")
            .field("now", &state.now)
            .field("pending", &state.queue.len())
            .finish()
    }
}

async fn settle() {
    for _ in 0..SETTLE_YIELDS {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DelayCancelled;
    use std::sync::Arc;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Callback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |tag: &'static str| -> Callback {
                let log = Arc::clone(&log);
                Box::new(move || log.lock().push(tag))
            }
        };
        (log, make)
    }

    #[tokio::test]
    async fn test_fires_in_due_order() {
        let scheduler = VirtualScheduler::new();
        let (log, cb) = recorder();

        scheduler.schedule(ms(3), cb("c"));
        scheduler.schedule(ms(1), cb("a"));
        scheduler.schedule(ms(2), cb("b"));
        scheduler.schedule(ms(10), cb("late"));

        scheduler.advance(ms(3)).await;
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(scheduler.now(), ms(3));
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test]
    async fn test_zero_delay_waits_for_advance() {
        let scheduler = VirtualScheduler::new();
        let (log, cb) = recorder();

        scheduler.schedule(Duration::ZERO, cb("now"));
        assert!(log.lock().is_empty());

        scheduler.advance(Duration::ZERO).await;
        assert_eq!(*log.lock(), vec!["now"]);
    }

    #[tokio::test]
    async fn test_tasks_scheduled_during_advance_fire_in_window() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let (log, cb) = recorder();

        let chained = {
            let scheduler = Arc::clone(&scheduler);
            let second = cb("second");
            let log = Arc::clone(&log);
            Box::new(move || {
                log.lock().push("first");
                scheduler.schedule(ms(2), second);
            })
        };
        scheduler.schedule(ms(1), chained);

        scheduler.advance(ms(3)).await;
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_cancel() {
        let scheduler = VirtualScheduler::new();
        let (log, cb) = recorder();

        let cancelled = scheduler.schedule(ms(1), cb("cancelled"));
        scheduler.schedule(ms(1), cb("kept"));
        scheduler.cancel(cancelled);
        scheduler.cancel(cancelled);

        scheduler.advance(ms(5)).await;
        assert_eq!(*log.lock(), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let scheduler = VirtualScheduler::new();
        let (log, cb) = recorder();

        scheduler.schedule(ms(1), cb("a"));
        scheduler.schedule(ms(2), cb("b"));
        scheduler.cancel_all();

        scheduler.advance(ms(5)).await;
        assert!(log.lock().is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stop_others() {
        let scheduler = VirtualScheduler::new();
        let (log, cb) = recorder();

        scheduler.schedule(ms(1), Box::new(|| panic!("callback failure")));
        scheduler.schedule(ms(1), cb("after"));

        scheduler.advance(ms(1)).await;
        assert_eq!(*log.lock(), vec!["after"]);
    }

    #[tokio::test]
    async fn test_delay_resolves_on_advance() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let done = Arc::new(Mutex::new(false));

        let waiter = {
            let scheduler = Arc::clone(&scheduler);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                scheduler.delay(ms(5)).await.unwrap();
                *done.lock() = true;
            })
        };

        scheduler.advance(ms(4)).await;
        assert!(!*done.lock());

        scheduler.advance(ms(1)).await;
        assert!(*done.lock());
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_delay_reports_cancellation() {
        let scheduler = VirtualScheduler::new();
        let delay = scheduler.delay(ms(5));

        scheduler.cancel_all();
        assert_eq!(delay.await, Err(DelayCancelled));
    }
}
