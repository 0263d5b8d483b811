//! Single-assignment result cell.

use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::core::{SchedulerError, Waitable};
use crate::runtime::context;
use crate::timeout::Timeout;

type Callback<T> = Box<dyn FnOnce(AsyncResult<T>) + Send>;

enum Slot<T> {
    Pending,
    Ready(Result<T, SchedulerError>),
    // Consumed internally by pool plumbing.
    Taken,
}

struct State<T> {
    slot: Slot<T>,
    callbacks: Vec<Callback<T>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

/// A value or error that will be supplied exactly once.
///
/// Retrievers block in [`AsyncResult::get`] or [`AsyncResult::wait`] until it
/// is resolved; done-callbacks run on the scheduler after resolution, never
/// inside the resolving call.
pub struct AsyncResult<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for AsyncResult<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for AsyncResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AsyncResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResult")
            .field("ready", &self.ready())
            .field("successful", &self.successful())
            .finish()
    }
}

impl<T> AsyncResult<T> {
    /// Create an unresolved result.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    slot: Slot::Pending,
                    callbacks: Vec::new(),
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Whether a value or error has been supplied.
    #[must_use]
    pub fn ready(&self) -> bool {
        !matches!(self.inner.state.lock().slot, Slot::Pending)
    }

    /// Whether the result was resolved with a value.
    #[must_use]
    pub fn successful(&self) -> bool {
        matches!(self.inner.state.lock().slot, Slot::Ready(Ok(_)))
    }

    /// The stored error, if the result was resolved with one.
    #[must_use]
    pub fn exception(&self) -> Option<SchedulerError> {
        match &self.inner.state.lock().slot {
            Slot::Ready(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    /// Block until the result is resolved or `timeout` elapses.
    ///
    /// Returns `true` once resolved, `false` on timeout. Never signals the
    /// stored error.
    pub async fn wait(&self, timeout: Option<Duration>) -> bool {
        if self.ready() {
            return true;
        }
        Timeout::from_option(timeout)
            .run(self.until_ready())
            .await
            .is_ok()
    }

    async fn until_ready(&self) {
        loop {
            let mut notified = pin!(self.inner.notify.notified());
            notified.as_mut().enable();
            if self.ready() {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn take(&self) -> Result<T, SchedulerError> {
        let mut state = self.inner.state.lock();
        match std::mem::replace(&mut state.slot, Slot::Taken) {
            Slot::Ready(outcome) => outcome,
            Slot::Pending => {
                state.slot = Slot::Pending;
                Err(SchedulerError::NotReady)
            }
            Slot::Taken => Err(SchedulerError::Runtime("result already taken".into())),
        }
    }
}

impl<T: 'static> AsyncResult<T> {
    /// Resolve with a value and wake all waiters.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyResolved`] if already resolved.
    pub fn set(&self, value: T) -> Result<(), SchedulerError> {
        self.resolve(Ok(value))
    }

    /// Resolve with an error and wake all waiters.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyResolved`] if already resolved.
    pub fn set_exception(&self, error: impl Into<anyhow::Error>) -> Result<(), SchedulerError> {
        self.resolve(Err(SchedulerError::failed(error)))
    }

    pub(crate) fn resolve(&self, outcome: Result<T, SchedulerError>) -> Result<(), SchedulerError> {
        let callbacks = {
            let mut state = self.inner.state.lock();
            if !matches!(state.slot, Slot::Pending) {
                return Err(SchedulerError::AlreadyResolved);
            }
            state.slot = Slot::Ready(outcome);
            std::mem::take(&mut state.callbacks)
        };
        self.inner.notify.notify_waiters();
        if !callbacks.is_empty() {
            debug!(callbacks = callbacks.len(), "Scheduling done callbacks");
        }
        for callback in callbacks {
            self.schedule(callback);
        }
        Ok(())
    }

    /// Register a callback to run on the scheduler once resolved.
    ///
    /// If the result is already resolved the callback is scheduled at once.
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(Self) + Send + 'static,
    {
        let callback: Callback<T> = Box::new(callback);
        {
            let mut state = self.inner.state.lock();
            if matches!(state.slot, Slot::Pending) {
                state.callbacks.push(callback);
                return;
            }
        }
        self.schedule(callback);
    }

    fn schedule(&self, callback: Callback<T>) {
        let result = self.clone();
        context::defer(move || callback(result));
    }
}

impl<T: Clone> AsyncResult<T> {
    /// Block until resolved, then return the value or signal the stored error.
    ///
    /// # Errors
    ///
    /// Returns the stored error, or [`SchedulerError::Timeout`] if `timeout`
    /// elapses first.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<T, SchedulerError> {
        if !self.ready() {
            Timeout::from_option(timeout)
                .run(self.until_ready())
                .await?;
        }
        self.get_nowait()
    }

    /// Return the value or stored error without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotReady`] if unresolved, or the stored error.
    pub fn get_nowait(&self) -> Result<T, SchedulerError> {
        match &self.inner.state.lock().slot {
            Slot::Ready(outcome) => outcome.clone(),
            Slot::Pending => Err(SchedulerError::NotReady),
            Slot::Taken => Err(SchedulerError::Runtime("result already taken".into())),
        }
    }
}

#[async_trait(?Send)]
impl<T> Waitable for AsyncResult<T> {
    fn is_ready(&self) -> bool {
        self.ready()
    }

    async fn wait_ready(&self) {
        self.until_ready().await;
    }
}
