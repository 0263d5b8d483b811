//! Thread-local scheduler context.
//!
//! Records whether a hub is currently driving this thread and which task unit
//! is being polled, and owns the lazily created per-thread default hub.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::core::task::TaskId;
use crate::core::SchedulerError;
use crate::runtime::Hub;

thread_local! {
    /// Nesting depth of `Hub::block_on` calls on this thread.
    static HUB_DEPTH: Cell<usize> = const { Cell::new(0) };

    /// Task unit currently being polled on this thread.
    static CURRENT_TASK: Cell<Option<TaskId>> = const { Cell::new(None) };

    /// Per-thread hub created on first implicit use.
    static DEFAULT_HUB: RefCell<Option<Rc<Hub>>> = const { RefCell::new(None) };
}

/// Marks the thread as driven by a hub until dropped.
pub(crate) struct HubGuard(());

impl Drop for HubGuard {
    fn drop(&mut self) {
        HUB_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

pub(crate) fn enter_hub() -> HubGuard {
    HUB_DEPTH.with(|depth| depth.set(depth.get() + 1));
    HubGuard(())
}

/// Whether a hub is driving the current thread.
pub(crate) fn in_hub() -> bool {
    HUB_DEPTH.with(|depth| depth.get() > 0)
}

/// Restores the previously polled task id when dropped.
pub(crate) struct TaskGuard {
    prev: Option<TaskId>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        CURRENT_TASK.with(|current| current.set(self.prev));
    }
}

pub(crate) fn enter_task(id: TaskId) -> TaskGuard {
    let prev = CURRENT_TASK.with(|current| current.replace(Some(id)));
    TaskGuard { prev }
}

/// Identifier of the task unit currently executing on this thread, if any.
///
/// Returns `None` when called from the hub's root future or outside a hub.
#[must_use]
pub fn current_task_id() -> Option<TaskId> {
    CURRENT_TASK.with(Cell::get)
}

/// Return this thread's default hub, creating it on first use.
pub(crate) fn default_hub() -> Result<Rc<Hub>, SchedulerError> {
    DEFAULT_HUB
        .try_with(|slot| {
            if let Some(hub) = slot.borrow().as_ref() {
                return Ok(Rc::clone(hub));
            }
            let hub = Rc::new(Hub::new()?);
            *slot.borrow_mut() = Some(Rc::clone(&hub));
            Ok(hub)
        })
        .map_err(|_| SchedulerError::Runtime("thread is shutting down".into()))?
}

/// Run `f` on the scheduler rather than synchronously.
///
/// Inside a running hub the job joins the active run queue; otherwise it
/// waits on the default hub until that hub is next driven. The job is
/// dropped if the thread has no scheduler left.
pub(crate) fn defer<F>(f: F)
where
    F: FnOnce() + 'static,
{
    let job = futures::future::lazy(move |_| f());
    if in_hub() {
        drop(tokio::task::spawn_local(job));
        return;
    }
    match default_hub() {
        Ok(hub) => hub.spawn_detached(job),
        Err(err) => tracing::warn!(error = %err, "No scheduler available, dropping callback"),
    }
}
