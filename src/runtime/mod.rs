//! Hub runtime and scheduler-level operations.
//!
//! Everything here cooperates with the hub driving the current thread:
//! [`sleep`] and the join helpers are suspension points, [`run_blocking`]
//! moves blocking work off the scheduler thread.

pub(crate) mod context;
pub mod hub;

use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::debug;

pub use crate::core::task::{spawn, spawn_later};
pub use context::current_task_id;
pub use hub::Hub;

use crate::core::task::TaskHandle;
use crate::core::{SchedulerError, Waitable};
use crate::timeout::Timeout;

/// Suspend the calling task unit for at least `duration`.
///
/// A zero duration yields: every other ready unit gets a turn before the
/// caller resumes.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(duration).await;
    }
}

/// Run `fut` to completion on this thread's default hub.
///
/// # Errors
///
/// Returns [`SchedulerError::Runtime`] if the default hub cannot be created.
///
/// # Panics
///
/// Panics if called from within a running hub.
pub fn run<F: Future>(fut: F) -> Result<F::Output, SchedulerError> {
    let hub = context::default_hub()?;
    Ok(hub.block_on(fut))
}

/// Run a blocking closure on the hub's helper threads without stalling the
/// scheduler.
///
/// # Errors
///
/// Returns [`SchedulerError::Runtime`] if no hub is running or the closure panicked.
pub async fn run_blocking<F, R>(f: F) -> Result<R, SchedulerError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if tokio::runtime::Handle::try_current().is_err() {
        return Err(SchedulerError::Runtime("run_blocking called outside a hub".into()));
    }
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SchedulerError::Runtime(format!("blocking job failed: {e}")))
}

/// Options for [`join_all`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinOptions {
    timeout: Option<Duration>,
    raise_on_error: bool,
}

impl JoinOptions {
    /// Wait without a deadline and ignore individual failures.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: None,
            raise_on_error: false,
        }
    }

    /// Stop waiting after `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Return the first task failure as an error.
    #[must_use]
    pub const fn with_raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }
}

/// Wait for a collection of task units.
///
/// Returns the handles that reached a terminal state, in completion order.
/// When the timeout expires first, only the finished subset is returned.
///
/// # Errors
///
/// With `raise_on_error`, returns the error of the first unit observed to
/// fail. Cancelled units are not treated as failures.
pub async fn join_all<T: 'static>(
    handles: &[TaskHandle<T>],
    options: JoinOptions,
) -> Result<Vec<TaskHandle<T>>, SchedulerError> {
    let mut pending: FuturesUnordered<_> = handles
        .iter()
        .map(|handle| async move {
            handle.join(None).await;
            handle
        })
        .collect();
    let mut finished = Vec::with_capacity(handles.len());

    let outcome = Timeout::from_option(options.timeout)
        .run(async {
            while let Some(handle) = pending.next().await {
                if options.raise_on_error && handle.failed() {
                    if let Some(err) = handle.error() {
                        return Err(err);
                    }
                }
                finished.push(handle.clone());
            }
            Ok(())
        })
        .await;

    match outcome {
        Ok(Err(err)) => Err(err),
        Ok(Ok(())) => Ok(finished),
        Err(expired) => {
            debug!(
                timeout_id = expired.id,
                finished = finished.len(),
                total = handles.len(),
                "Join timed out"
            );
            Ok(finished)
        }
    }
}

/// Wait until `count` of `objects` are ready (all of them when `None`).
///
/// Returns the indices of ready objects in the order they became ready. On
/// timeout the indices ready so far are returned.
pub async fn wait(
    objects: &[&dyn Waitable],
    timeout: Option<Duration>,
    count: Option<usize>,
) -> Vec<usize> {
    let wanted = count.unwrap_or(objects.len()).min(objects.len());
    let mut ready = Vec::with_capacity(wanted);
    if wanted == 0 {
        return ready;
    }
    let mut pending: FuturesUnordered<_> = objects
        .iter()
        .enumerate()
        .map(|(index, object)| async move {
            object.wait_ready().await;
            index
        })
        .collect();

    let _ = Timeout::from_option(timeout)
        .run(async {
            while let Some(index) = pending.next().await {
                ready.push(index);
                if ready.len() >= wanted {
                    break;
                }
            }
        })
        .await;
    ready
}
