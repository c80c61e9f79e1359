//! Deferred-callback scheduling.
//!
//! Polling code never touches timers directly; it is handed a [`Scheduler`]
//! instead. [`TokioScheduler`] runs callbacks on tokio timers,
//! [`VirtualScheduler`] runs them when a test advances its simulated clock.
//!
//! A scheduler may be shared. [`Scheduler::cancel_all`] then cancels the
//! tasks of every user of that instance, so values with independent
//! lifetimes should each get their own scheduler.

mod realtime;
mod virtual_time;

pub use realtime::TokioScheduler;
pub use virtual_time::VirtualScheduler;

use futures::future::BoxFuture;
use std::fmt::{self, Debug};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::DelayCancelled;

/// Callback run when a scheduled task fires.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a pending scheduled task.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Capability to run callbacks after a delay.
pub trait Scheduler: Send + Sync + Debug {
    /// Register `callback` to run no earlier than `delay` from now.
    ///
    /// The callback is never run synchronously from within this call, even
    /// for a zero delay.
    fn schedule(&self, delay: Duration, callback: Callback) -> TaskId;

    /// Cancel a pending task. No-op if it already fired or was cancelled.
    fn cancel(&self, task: TaskId);

    /// Cancel every task currently pending on this scheduler.
    fn cancel_all(&self);

    /// Resolve after `duration`, driven by [`Scheduler::schedule`] so that a
    /// virtual clock controls it too.
    ///
    /// Resolves to [`DelayCancelled`] if the underlying task is cancelled.
    fn delay(&self, duration: Duration) -> BoxFuture<'static, Result<(), DelayCancelled>> {
        let (tx, rx) = oneshot::channel();
        self.schedule(
            duration,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        Box::pin(async move { rx.await.map_err(|_| DelayCancelled) })
    }
}
