//! Self-refreshing cache of a single slowly-changing value.
//!
//! A polled value fetches immediately on construction and then again
//! `interval` after every completed attempt, successful or not. At most one
//! fetch is ever in flight: [`PolledValue::latest`] joins the running cycle
//! instead of starting a second one. Failed fetches leave the cache untouched
//! and are only reported to callers awaiting that cycle.
//!
//! Timers come from the injected [`Scheduler`], so the whole lifecycle can be
//! driven deterministically with a
//! [`VirtualScheduler`](crate::scheduler::VirtualScheduler).

use futures::future::{self, BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::PollError;
use crate::scheduler::{Scheduler, TaskId};

type FetchFn<T> = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;
type Listener<T> = Arc<dyn Fn(&T, Option<&T>) + Send + Sync>;
type Cycle<T> = Shared<BoxFuture<'static, Result<T, PollError>>>;

/// Polled value without a default: reads wait for the first successful
/// fetch.
///
/// Cloning yields another handle to the same cache.
pub struct PolledValue<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    /// Name used in logs and errors
    name: String,
    /// Source of timers for the refresh cycle
    scheduler: Arc<dyn Scheduler>,
    /// Produces the value
    fetch: FetchFn<T>,
    /// Delay between the end of one attempt and the start of the next
    interval: Duration,
    state: Mutex<State<T>>,
}

struct State<T> {
    /// Result of the most recent successful fetch
    last_known_good: Option<T>,
    /// Cycle currently in flight
    outstanding: Option<Cycle<T>>,
    /// Notified in registration order after every successful fetch
    listeners: Vec<Listener<T>>,
    /// Pending refresh task
    scheduled: Option<TaskId>,
    /// Set once shutdown begins; no cycle starts or gets scheduled after it
    shutting_down: bool,
}

impl<T> PolledValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create the value and start its first fetch.
    ///
    /// Must be called from within a tokio runtime: each fetch cycle runs as
    /// a spawned task.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        scheduler: Arc<dyn Scheduler>,
        interval: Duration,
        fetch: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let inner = Arc::new(Inner {
            name: name.into(),
            scheduler,
            fetch: Box::new(move || fetch().boxed()),
            interval,
            state: Mutex::new(State {
                last_known_good: None,
                outstanding: None,
                listeners: Vec::new(),
                scheduled: None,
                shutting_down: false,
            }),
        });
        debug!(name = %inner.name, interval_ms = interval.as_millis() as u64, "Polled value created");
        inner.start_cycle();
        Self { inner }
    }

    /// Result of the fetch in flight, or of a fresh one if none is.
    ///
    /// Starting a fresh fetch replaces the pending scheduled refresh. The
    /// fetch starts when this is called, not when the future is first
    /// polled.
    pub fn latest(&self) -> BoxFuture<'static, Result<T, PollError>> {
        self.inner.begin_cycle().boxed()
    }

    /// The last known good value, or [`latest`](Self::latest) if no fetch
    /// has succeeded yet.
    pub fn cached(&self) -> BoxFuture<'static, Result<T, PollError>> {
        match self.last_known_good() {
            Some(value) => future::ready(Ok(value)).boxed(),
            None => self.latest(),
        }
    }

    /// Synchronous peek at the last known good value.
    pub fn last_known_good(&self) -> Option<T> {
        self.inner.state.lock().last_known_good.clone()
    }

    /// Call `listener` with `(new, previous)` after every successful fetch.
    ///
    /// `previous` is `None` on the first success. Listeners run in
    /// registration order; a panicking listener is logged and skipped.
    pub fn register_listener<F>(&self, listener: F)
    where
        F: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        self.inner.state.lock().listeners.push(Arc::new(listener));
    }

    /// `true` while a fetch cycle is in flight.
    pub fn is_fetching(&self) -> bool {
        self.inner.state.lock().outstanding.is_some()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Stop polling.
    ///
    /// Waits for the cycle in flight to finish, then cancels the pending
    /// refresh and every task on the scheduler. Afterwards
    /// [`latest`](Self::latest) fails with [`PollError::ShutDown`] and the
    /// fetch function is never called again.
    pub async fn shutdown(&self) {
        let mut outstanding = {
            let mut state = self.inner.state.lock();
            state.shutting_down = true;
            state.outstanding.clone()
        };

        while let Some(cycle) = outstanding {
            // Outcome already reported to whoever awaited it.
            let _ = cycle.await;
            outstanding = self.inner.state.lock().outstanding.clone();
        }

        if let Some(task) = self.inner.state.lock().scheduled.take() {
            self.inner.scheduler.cancel(task);
        }
        self.inner.scheduler.cancel_all();
        info!(name = %self.inner.name, "Polled value shut down");
    }
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start a cycle nobody awaits; the spawned task drives it.
    fn start_cycle(self: &Arc<Self>) {
        drop(self.begin_cycle());
    }

    /// Join the cycle in flight or start a new one.
    fn begin_cycle(self: &Arc<Self>) -> Cycle<T> {
        let mut state = self.state.lock();
        if let Some(cycle) = &state.outstanding {
            return cycle.clone();
        }
        if state.shutting_down {
            let err = PollError::ShutDown(self.name.clone());
            return future::ready(Err(err)).boxed().shared();
        }
        if let Some(task) = state.scheduled.take() {
            self.scheduler.cancel(task);
        }

        let previous = state.last_known_good.clone();
        let cycle = Arc::clone(self).run_cycle(previous).boxed().shared();
        state.outstanding = Some(cycle.clone());
        drop(state);

        // Drives the cycle even when nobody awaits it.
        tokio::spawn(cycle.clone());
        cycle
    }

    async fn run_cycle(self: Arc<Self>, previous: Option<T>) -> Result<T, PollError> {
        debug!(name = %self.name, "Fetching");

        let attempt = AssertUnwindSafe(async { (self.fetch)().await })
            .catch_unwind()
            .await;

        let error = match attempt {
            Ok(Ok(value)) => {
                self.store(&value, previous.as_ref());
                self.schedule_next();
                return Ok(value);
            }
            Ok(Err(err)) => {
                warn!(name = %self.name, error = %err, "Fetch failed, keeping cached value");
                PollError::Fetch {
                    name: self.name.clone(),
                    cause: Arc::new(err),
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(name = %self.name, panic = message, "Fetch panicked, keeping cached value");
                PollError::Fetch {
                    name: self.name.clone(),
                    cause: Arc::new(anyhow::anyhow!("fetch panicked: {message}")),
                }
            }
        };

        self.state.lock().outstanding = None;
        self.schedule_next();
        Err(error)
    }

    /// Record a successful fetch, end the cycle and notify listeners
    /// outside the lock.
    ///
    /// The cycle is over before listeners run, so a listener sees
    /// `is_fetching() == false` and may start a fresh fetch.
    fn store(&self, value: &T, previous: Option<&T>) {
        let listeners = {
            let mut state = self.state.lock();
            state.last_known_good = Some(value.clone());
            state.outstanding = None;
            state.listeners.clone()
        };
        debug!(name = %self.name, listeners = listeners.len(), "Fetch succeeded");

        for (index, listener) in listeners.iter().enumerate() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(value, previous))) {
                error!(
                    name = %self.name,
                    listener = index,
                    panic = panic_message(payload.as_ref()),
                    "Listener panicked"
                );
            }
        }
    }

    /// Schedule the next cycle after the one that just ended.
    ///
    /// Skipped while shutting down, and when a listener or caller already
    /// started a new cycle, which schedules its own successor.
    fn schedule_next(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.shutting_down {
            debug!(name = %self.name, "Shutting down, not rescheduling");
            return;
        }
        if state.outstanding.is_some() {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let task = self.scheduler.schedule(
            self.interval,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.start_cycle();
                }
            }),
        );
        state.scheduled = Some(task);
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(task) = self.state.get_mut().scheduled.take() {
            self.scheduler.cancel(task);
        }
    }
}

impl<T> Clone for PolledValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PolledValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("PolledValue")
            .field("name", &self.inner.name)
            .field("interval", &self.inner.interval)
            .field("last_known_good", &state.last_known_good)
            .field("fetching", &state.outstanding.is_some())
            .field("listeners", &state.listeners.len())
            .finish_non_exhaustive()
    }
}

/// Polled value that exposes a default until the first successful fetch.
pub struct PolledValueWithDefault<T> {
    value: PolledValue<T>,
    default: T,
}

impl<T> PolledValueWithDefault<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create the value and start its first fetch. See [`PolledValue::new`].
    pub fn new<F, Fut>(
        name: impl Into<String>,
        scheduler: Arc<dyn Scheduler>,
        interval: Duration,
        default: T,
        fetch: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            value: PolledValue::new(name, scheduler, interval, fetch),
            default,
        }
    }

    /// Last known good value, or the default if no fetch has succeeded.
    pub fn cached(&self) -> T {
        self.value
            .last_known_good()
            .unwrap_or_else(|| self.default.clone())
    }

    /// See [`PolledValue::latest`].
    pub fn latest(&self) -> BoxFuture<'static, Result<T, PollError>> {
        self.value.latest()
    }

    pub fn last_known_good(&self) -> Option<T> {
        self.value.last_known_good()
    }

    /// Call `listener` with `(new, previous)` after every successful fetch;
    /// `previous` is the default on the first success.
    pub fn register_listener<F>(&self, listener: F)
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let default = self.default.clone();
        self.value
            .register_listener(move |new, previous| listener(new, previous.unwrap_or(&default)));
    }

    pub fn is_fetching(&self) -> bool {
        self.value.is_fetching()
    }

    pub fn name(&self) -> &str {
        self.value.name()
    }

    /// See [`PolledValue::shutdown`].
    pub async fn shutdown(&self) {
        self.value.shutdown().await
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PolledValueWithDefault<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolledValueWithDefault")
            .field("value", &self.value)
            .field("default", &self.default)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
