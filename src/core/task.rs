//! Task units: independently scheduled flows of control.
//!
//! A task unit wraps a future and runs it cooperatively on a hub. It moves
//! through a fixed lifecycle and records exactly one terminal outcome:
//!
//! ```text
//! Queued -> Created -> Running <-> Suspended -> Completed | Failed | Cancelled
//! ```
//!
//! `Queued` only applies to units submitted to a full pool. A kill request is
//! honoured the next time the unit is polled or suspends; the body future is
//! then dropped, which runs any cleanup it owns.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn, Instrument as _};

use crate::async_result::AsyncResult;
use crate::core::{SchedulerError, Waitable};
use crate::lock::Permit;
use crate::runtime::{context, Hub};

/// Unique identifier of a task unit.
pub type TaskId = u64;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a task unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for a pool slot.
    Queued,
    /// Spawned, not yet started.
    Created,
    /// Currently executing.
    Running,
    /// Parked at a suspension point.
    Suspended,
    /// Finished with a value.
    Completed,
    /// Finished with an error or panic.
    Failed,
    /// Killed before finishing.
    Cancelled,
}

impl TaskState {
    /// Whether the state is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

type FinishHook = Box<dyn FnOnce(TaskState) + Send>;
type Body<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>>>>;
pub(crate) type Admission = Pin<Box<dyn Future<Output = Permit>>>;

struct Control {
    state: TaskState,
    kill_requested: bool,
    waker: Option<Waker>,
    on_finish: Vec<FinishHook>,
}

pub(crate) struct TaskCell<T> {
    id: TaskId,
    name: Option<String>,
    parent: Option<TaskId>,
    control: Mutex<Control>,
    result: AsyncResult<T>,
}

impl<T> TaskCell<T> {
    fn new(id: TaskId, name: Option<String>, parent: Option<TaskId>, state: TaskState) -> Self {
        Self {
            id,
            name,
            parent,
            control: Mutex::new(Control {
                state,
                kill_requested: false,
                waker: None,
                on_finish: Vec::new(),
            }),
            result: AsyncResult::new(),
        }
    }

    fn kill_requested(&self) -> bool {
        self.control.lock().kill_requested
    }

    fn set_state(&self, state: TaskState) {
        self.control.lock().state = state;
    }

    /// Record a parked state and the waker to use for a later kill.
    /// Returns whether a kill has been requested in the meantime.
    fn park(&self, state: TaskState, waker: &Waker) -> bool {
        let mut control = self.control.lock();
        control.state = state;
        match &control.waker {
            Some(current) if current.will_wake(waker) => {}
            _ => control.waker = Some(waker.clone()),
        }
        control.kill_requested
    }
}

impl<T: 'static> TaskCell<T> {
    fn finalize(&self, state: TaskState, outcome: Result<T, SchedulerError>) {
        if self.result.resolve(outcome).is_err() {
            warn!(task_id = self.id, "Task outcome recorded twice");
            return;
        }
        let hooks = {
            let mut control = self.control.lock();
            control.state = state;
            control.waker = None;
            std::mem::take(&mut control.on_finish)
        };
        for hook in hooks {
            hook(state);
        }
    }
}

/// Cancellation seam used by pools to kill their members.
pub(crate) trait Killable: Send + Sync {
    fn kill(&self);
}

/// Handle to a spawned task unit.
///
/// Handles are cheap to clone; every clone observes the same unit.
pub struct TaskHandle<T> {
    cell: Arc<TaskCell<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.cell.id)
            .field("name", &self.cell.name)
            .field("state", &self.state())
            .finish()
    }
}

impl<T> TaskHandle<T> {
    /// Unique identifier.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.cell.id
    }

    /// Name given at spawn time.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.cell.name.as_deref()
    }

    /// Identifier of the task unit that spawned this one.
    #[must_use]
    pub fn parent(&self) -> Option<TaskId> {
        self.cell.parent
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.cell.control.lock().state
    }

    /// Whether the unit has reached a terminal state.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.state().is_terminal()
    }

    /// Whether the unit completed with a value.
    #[must_use]
    pub fn successful(&self) -> bool {
        self.state() == TaskState::Completed
    }

    /// Whether the unit failed with an error or panic.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.state() == TaskState::Failed
    }

    /// The captured error of a failed or cancelled unit.
    #[must_use]
    pub fn error(&self) -> Option<SchedulerError> {
        self.cell.result.exception()
    }

    /// Request cancellation.
    ///
    /// Non-blocking and idempotent; has no effect on a finished unit. The unit
    /// observes the request at its next poll or suspension point.
    pub fn kill(&self) {
        let waker = {
            let mut control = self.cell.control.lock();
            if control.state.is_terminal() || control.kill_requested {
                return;
            }
            control.kill_requested = true;
            control.waker.take()
        };
        debug!(task_id = self.cell.id, "Kill requested");
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Block until the unit finishes or `timeout` elapses.
    ///
    /// Returns `true` if the unit is finished. Never signals the unit's error.
    pub async fn join(&self, timeout: Option<Duration>) -> bool {
        self.cell.result.wait(timeout).await
    }

    /// Request cancellation and wait for the unit to finish.
    pub async fn kill_and_join(&self, timeout: Option<Duration>) -> bool {
        self.kill();
        self.join(timeout).await
    }

    /// Register a callback invoked with this handle once the unit finishes.
    ///
    /// The callback runs on the scheduler, never inside the finishing unit.
    pub fn link<F>(&self, callback: F)
    where
        F: FnOnce(Self) + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.clone();
        self.cell.result.add_done_callback(move |_| callback(handle));
    }

    /// Run `hook` synchronously when the unit finishes, or now if finished.
    pub(crate) fn on_finish<F>(&self, hook: F)
    where
        F: FnOnce(TaskState) + Send + 'static,
    {
        let state = {
            let mut control = self.cell.control.lock();
            if !control.state.is_terminal() {
                control.on_finish.push(Box::new(hook));
                return;
            }
            control.state
        };
        hook(state);
    }

    /// Take the value out of a finished unit, consuming this handle.
    ///
    /// Unlike [`TaskHandle::value`] this does not require `T: Clone`. The
    /// value is moved out, so other clones of the handle can no longer read it.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotReady`] if the unit has not finished, or
    /// the unit's failure or cancellation.
    pub fn into_value(self) -> Result<T, SchedulerError> {
        if !self.ready() {
            return Err(SchedulerError::NotReady);
        }
        self.take_outcome()
    }

    /// Move the outcome out of a finished unit.
    pub(crate) fn take_outcome(&self) -> Result<T, SchedulerError> {
        self.cell.result.take()
    }
}

impl<T: Clone> TaskHandle<T> {
    /// Block until the unit finishes, then return its value or signal its error.
    ///
    /// # Errors
    ///
    /// Returns the unit's failure or cancellation, or
    /// [`SchedulerError::Timeout`] if `timeout` elapses first.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<T, SchedulerError> {
        self.cell.result.get(timeout).await
    }

    /// The value of a completed unit.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotReady`] unless the unit is `Completed`.
    pub fn value(&self) -> Result<T, SchedulerError> {
        if !self.successful() {
            return Err(SchedulerError::NotReady);
        }
        self.cell.result.get_nowait()
    }
}

impl<T: Send> Killable for TaskHandle<T> {
    fn kill(&self) {
        Self::kill(self);
    }
}

#[async_trait(?Send)]
impl<T> Waitable for TaskHandle<T> {
    fn is_ready(&self) -> bool {
        self.ready()
    }

    async fn wait_ready(&self) {
        self.join(None).await;
    }
}

/// Future driven by the hub on behalf of one task unit.
struct TaskFuture<T: 'static> {
    cell: Arc<TaskCell<T>>,
    admission: Option<Admission>,
    permit: Option<Permit>,
    start_at: Option<Instant>,
    sleeper: Option<Pin<Box<tokio::time::Sleep>>>,
    body: Option<Body<T>>,
}

impl<T: 'static> TaskFuture<T> {
    fn finish(&mut self, outcome: Result<T, SchedulerError>) {
        let state = match &outcome {
            Ok(_) => TaskState::Completed,
            Err(SchedulerError::Cancelled { .. }) => TaskState::Cancelled,
            Err(_) => TaskState::Failed,
        };
        self.body = None;
        self.admission = None;
        self.sleeper = None;
        self.permit = None;
        match &outcome {
            Ok(_) => debug!(task_id = self.cell.id, "Task completed"),
            Err(err) if state == TaskState::Cancelled => {
                debug!(task_id = self.cell.id, %err, "Task cancelled");
            }
            Err(err) => warn!(task_id = self.cell.id, %err, "Task failed"),
        }
        self.cell.finalize(state, outcome);
    }

    fn cancel(&mut self) {
        let id = self.cell.id;
        self.finish(Err(SchedulerError::Cancelled { id }));
    }
}

impl<T: 'static> Future for TaskFuture<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.body.is_none() {
            return Poll::Ready(());
        }
        if this.cell.kill_requested() {
            this.cancel();
            return Poll::Ready(());
        }

        if let Some(admission) = this.admission.as_mut() {
            match admission.as_mut().poll(cx) {
                Poll::Pending => {
                    if this.cell.park(TaskState::Queued, cx.waker()) {
                        this.cancel();
                        return Poll::Ready(());
                    }
                    return Poll::Pending;
                }
                Poll::Ready(permit) => {
                    debug!(task_id = this.cell.id, "Task admitted to pool");
                    this.permit = Some(permit);
                    this.admission = None;
                    this.cell.set_state(TaskState::Created);
                }
            }
        }

        if let Some(start_at) = this.start_at.take() {
            this.sleeper = Some(Box::pin(tokio::time::sleep_until(start_at)));
        }
        if let Some(sleeper) = this.sleeper.as_mut() {
            if sleeper.as_mut().poll(cx).is_pending() {
                if this.cell.park(TaskState::Created, cx.waker()) {
                    this.cancel();
                    return Poll::Ready(());
                }
                return Poll::Pending;
            }
            this.sleeper = None;
        }

        let Some(body) = this.body.as_mut() else {
            return Poll::Ready(());
        };
        this.cell.set_state(TaskState::Running);
        let polled = {
            let _current = context::enter_task(this.cell.id);
            std::panic::catch_unwind(AssertUnwindSafe(|| body.as_mut().poll(cx)))
        };

        let id = this.cell.id;
        match polled {
            Ok(Poll::Pending) => {
                if this.cell.park(TaskState::Suspended, cx.waker()) {
                    this.cancel();
                    return Poll::Ready(());
                }
                Poll::Pending
            }
            Ok(Poll::Ready(Ok(value))) => {
                this.finish(Ok(value));
                Poll::Ready(())
            }
            Ok(Poll::Ready(Err(err))) => {
                this.finish(Err(SchedulerError::task_failed(id, err)));
                Poll::Ready(())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                this.finish(Err(SchedulerError::task_failed(
                    id,
                    anyhow::anyhow!("task panicked: {message}"),
                )));
                Poll::Ready(())
            }
        }
    }
}

impl<T: 'static> Drop for TaskFuture<T> {
    fn drop(&mut self) {
        if self.body.is_some() {
            debug!(task_id = self.cell.id, "Task dropped before finishing");
            self.cancel();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}

/// Configures a task unit before spawning it.
#[derive(Debug, Clone, Default)]
pub struct TaskBuilder {
    name: Option<String>,
    delay: Option<Duration>,
}

impl TaskBuilder {
    /// Create a builder with no name and no start delay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the unit for diagnostics.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Start the body no sooner than `delay` after the unit is spawned.
    ///
    /// The deadline is fixed at spawn time; time spent queued for a pool slot
    /// counts towards it.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Spawn on the hub driving this thread, or queue it on the default hub.
    pub fn spawn<F, T>(self, fut: F) -> TaskHandle<T>
    where
        F: Future<Output = anyhow::Result<T>> + 'static,
        T: 'static,
    {
        self.launch(None, None, TaskState::Created, fut)
    }

    /// Spawn on a specific hub.
    pub fn spawn_on<F, T>(self, hub: &Hub, fut: F) -> TaskHandle<T>
    where
        F: Future<Output = anyhow::Result<T>> + 'static,
        T: 'static,
    {
        self.launch(Some(hub), None, TaskState::Created, fut)
    }

    /// Spawn a unit that must first be admitted through `admission`.
    pub(crate) fn spawn_admitted<F, T>(self, admission: Admission, queued: bool, fut: F) -> TaskHandle<T>
    where
        F: Future<Output = anyhow::Result<T>> + 'static,
        T: 'static,
    {
        let initial = if queued {
            TaskState::Queued
        } else {
            TaskState::Created
        };
        self.launch(None, Some(admission), initial, fut)
    }

    fn launch<F, T>(
        self,
        hub: Option<&Hub>,
        admission: Option<Admission>,
        initial: TaskState,
        fut: F,
    ) -> TaskHandle<T>
    where
        F: Future<Output = anyhow::Result<T>> + 'static,
        T: 'static,
    {
        let id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
        let parent = context::current_task_id();
        let cell = Arc::new(TaskCell::new(id, self.name, parent, initial));
        let span = tracing::debug_span!("task", task_id = id, name = cell.name.as_deref());
        let mut task = TaskFuture {
            cell: Arc::clone(&cell),
            admission,
            permit: None,
            start_at: self.delay.map(|delay| Instant::now() + delay),
            sleeper: None,
            body: Some(Box::pin(fut)),
        };
        debug!(task_id = id, parent, delay = ?self.delay, ?initial, "Task spawned");

        match hub {
            Some(hub) => hub.spawn_detached(task.instrument(span)),
            None if context::in_hub() => drop(tokio::task::spawn_local(task.instrument(span))),
            None => match context::default_hub() {
                Ok(hub) => hub.spawn_detached(task.instrument(span)),
                Err(err) => {
                    warn!(task_id = id, %err, "Task could not be scheduled");
                    task.finish(Err(err));
                }
            },
        }
        TaskHandle { cell }
    }
}

/// Spawn a task unit running `fut`.
///
/// Inside a running hub the unit joins that hub. Outside any hub it is
/// bound to this thread's default hub and only runs once that hub is driven
/// through [`crate::run`]; waiting on it from another [`Hub`] never completes.
/// Use [`Hub::spawn`] to target a specific hub.
pub fn spawn<F, T>(fut: F) -> TaskHandle<T>
where
    F: Future<Output = anyhow::Result<T>> + 'static,
    T: 'static,
{
    TaskBuilder::new().spawn(fut)
}

/// Spawn a task unit whose body starts at least `delay` after this call.
///
/// Hub selection follows [`spawn`].
pub fn spawn_later<F, T>(delay: Duration, fut: F) -> TaskHandle<T>
where
    F: Future<Output = anyhow::Result<T>> + 'static,
    T: 'static,
{
    TaskBuilder::new().delay(delay).spawn(fut)
}
