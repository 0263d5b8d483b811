//! Bounded group of task units.
//!
//! A [`Pool`] caps how many of its members run at once. Spawning into a full
//! pool never blocks the caller: the new unit is created in the `Queued`
//! state and starts when a slot frees up, in submission order.
//!
//! ```rust,ignore
//! let pool = Pool::new(3)?;
//! let squares = pool.map(0..10_u64, |n| async move { Ok(n * n) }).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::core::imap::IMap;
use crate::core::task::{Killable, TaskBuilder, TaskHandle, TaskId, TaskState};
use crate::core::{MapFailure, SchedulerError, Waitable};
use crate::event::Event;
use crate::lock::Semaphore;

/// Snapshot of pool activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Pool name.
    pub name: String,
    /// Maximum concurrently running members.
    pub capacity: usize,
    /// Members currently holding a slot.
    pub active_tasks: usize,
    /// Members waiting for a slot.
    pub queued_tasks: usize,
    /// Total members spawned.
    pub submitted_tasks: u64,
    /// Members that completed with a value.
    pub completed_tasks: u64,
    /// Members that failed.
    pub failed_tasks: u64,
    /// Members that were cancelled.
    pub cancelled_tasks: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    submitted_tasks: AtomicU64,
    completed_tasks: AtomicU64,
    failed_tasks: AtomicU64,
    cancelled_tasks: AtomicU64,
}

impl PoolCounters {
    fn record(&self, state: TaskState) {
        let counter = match state {
            TaskState::Completed => &self.completed_tasks,
            TaskState::Failed => &self.failed_tasks,
            _ => &self.cancelled_tasks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct PoolInner {
    name: String,
    capacity: usize,
    slots: Semaphore,
    counters: PoolCounters,
    idle: Event,
    closed: AtomicBool,
    members: Mutex<HashMap<TaskId, Arc<dyn Killable>>>,
}

impl PoolInner {
    fn member_finished(&self, id: TaskId, state: TaskState) {
        self.counters.record(state);
        let now_empty = {
            let mut members = self.members.lock();
            members.remove(&id);
            members.is_empty()
        };
        debug!(pool = %self.name, task_id = id, ?state, "Pool member finished");
        if now_empty {
            self.idle.set();
        }
    }
}

/// A group of task units with a concurrency cap.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl Pool {
    /// Create a pool allowing `capacity` members to run at once.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, SchedulerError> {
        Self::from_config("pool", &PoolConfig::new(capacity))
    }

    /// Create a pool with a diagnostic name.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if `capacity` is zero.
    pub fn with_name(name: impl Into<String>, capacity: usize) -> Result<Self, SchedulerError> {
        Self::from_config(name, &PoolConfig::new(capacity))
    }

    /// Create a named pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if the configuration is invalid.
    pub fn from_config(name: impl Into<String>, config: &PoolConfig) -> Result<Self, SchedulerError> {
        let name = name.into();
        config
            .validate()
            .map_err(|e| SchedulerError::InvalidConfig(format!("pool `{name}`: {e}")))?;
        let idle = Event::new();
        idle.set();
        info!(pool = %name, capacity = config.capacity, "Pool created");
        Ok(Self {
            inner: Arc::new(PoolInner {
                name,
                capacity: config.capacity,
                slots: Semaphore::new(config.capacity),
                counters: PoolCounters::default(),
                idle,
                closed: AtomicBool::new(false),
                members: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Pool name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Maximum concurrently running members.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of unfinished members, running or queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.members.lock().len()
    }

    /// Whether the pool has no unfinished members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of free slots.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.inner.slots.available()
    }

    /// Whether every slot is taken.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free_count() == 0
    }

    /// Whether the pool refuses new spawns.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Stop accepting spawns. Existing members keep running.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            info!(pool = %self.inner.name, "Pool closed");
        }
    }

    /// Spawn `fut` as a pool member.
    ///
    /// Returns immediately; if no slot is free the member is `Queued` until
    /// one is released.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::PoolClosed`] after [`Pool::close`].
    pub fn spawn<F, T>(&self, fut: F) -> Result<TaskHandle<T>, SchedulerError>
    where
        F: Future<Output = anyhow::Result<T>> + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            warn!(pool = %self.inner.name, "Spawn rejected: pool closed");
            return Err(SchedulerError::PoolClosed(self.inner.name.clone()));
        }
        let ticket = self.inner.slots.reserve();
        let queued = !ticket.is_granted();
        self.inner.idle.clear();
        self.inner
            .counters
            .submitted_tasks
            .fetch_add(1, Ordering::Relaxed);

        let handle = TaskBuilder::new().spawn_admitted(Box::pin(ticket.admit()), queued, fut);
        let id = handle.id();
        self.inner
            .members
            .lock()
            .insert(id, Arc::new(handle.clone()));
        let pool = Arc::downgrade(&self.inner);
        handle.on_finish(move |state| {
            if let Some(pool) = Weak::upgrade(&pool) {
                pool.member_finished(id, state);
            }
        });
        debug!(pool = %self.inner.name, task_id = id, queued, "Pool member spawned");
        Ok(handle)
    }

    /// Spawn `fut` and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::PoolClosed`] after [`Pool::close`], or the
    /// member's own failure or cancellation.
    pub async fn apply<F, T>(&self, fut: F) -> Result<T, SchedulerError>
    where
        F: Future<Output = anyhow::Result<T>> + 'static,
        T: Send + 'static,
    {
        let handle = self.spawn(fut)?;
        handle.join(None).await;
        handle.take_outcome()
    }

    /// Apply `f` to every item concurrently and collect results in input order.
    ///
    /// Every element runs to completion even when some fail.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::MapFailed`] listing every failed index.
    pub async fn map<I, F, Fut, T>(&self, items: I, f: F) -> Result<Vec<T>, SchedulerError>
    where
        I: IntoIterator,
        I::IntoIter: 'static,
        F: FnMut(I::Item) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
        T: Send + 'static,
    {
        let mut results = self.imap(items, f);
        let mut values = Vec::new();
        let mut failures = Vec::new();
        let mut total = 0;
        while let Some(outcome) = results.next().await {
            match outcome {
                Ok(value) => values.push(value),
                Err(err) => failures.push((total, err)),
            }
            total += 1;
        }
        if failures.is_empty() {
            return Ok(values);
        }
        warn!(
            pool = %self.inner.name,
            failed = failures.len(),
            total,
            "Map finished with failures"
        );
        Err(MapFailure { total, failures }.into())
    }

    /// Apply `f` to every item concurrently, yielding results in input order.
    ///
    /// Items are pulled from `items` only as pool slots free up, so the
    /// source may be unbounded.
    pub fn imap<I, F, Fut, T>(&self, items: I, f: F) -> IMap<T>
    where
        I: IntoIterator,
        I::IntoIter: 'static,
        F: FnMut(I::Item) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
        T: Send + 'static,
    {
        IMap::start(self, items, f, true)
    }

    /// Apply `f` to every item concurrently, yielding results as they finish.
    pub fn imap_unordered<I, F, Fut, T>(&self, items: I, f: F) -> IMap<T>
    where
        I: IntoIterator,
        I::IntoIter: 'static,
        F: FnMut(I::Item) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
        T: Send + 'static,
    {
        IMap::start(self, items, f, false)
    }

    /// Block until every member has finished or `timeout` elapses.
    ///
    /// Returns `true` when the pool is empty.
    pub async fn join(&self, timeout: Option<Duration>) -> bool {
        self.inner.idle.wait(timeout).await
    }

    /// Request cancellation of every unfinished member.
    pub fn kill(&self) {
        let members: Vec<_> = self.inner.members.lock().values().cloned().collect();
        info!(pool = %self.inner.name, members = members.len(), "Killing pool members");
        for member in members {
            member.kill();
        }
    }

    /// Block until a slot is free or `timeout` elapses.
    pub async fn wait_available(&self, timeout: Option<Duration>) -> bool {
        self.inner.slots.wait_available(timeout).await
    }

    /// Snapshot of pool activity.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let counters = &self.inner.counters;
        let members = self.len();
        let queued = self.inner.slots.waiting();
        PoolStats {
            name: self.inner.name.clone(),
            capacity: self.inner.capacity,
            active_tasks: members.saturating_sub(queued),
            queued_tasks: queued,
            submitted_tasks: counters.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: counters.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: counters.failed_tasks.load(Ordering::Relaxed),
            cancelled_tasks: counters.cancelled_tasks.load(Ordering::Relaxed),
        }
    }
}

#[async_trait(?Send)]
impl Waitable for Pool {
    fn is_ready(&self) -> bool {
        self.is_empty()
    }

    async fn wait_ready(&self) {
        self.join(None).await;
    }
}
