//! Queues for passing items between task units.
//!
//! [`Queue`] is generic over a [`Discipline`] that decides retrieval order:
//! [`Fifo`] by default, [`Lifo`] for [`LifoQueue`], and [`PriorityOrder`] for
//! [`PriorityQueue`]. [`JoinableQueue`] adds completion tracking on top.
//!
//! A `maxsize` of `None` or `0` means unbounded. A timeout of
//! `Some(Duration::ZERO)` behaves like the `_nowait` variant.

pub mod discipline;
pub mod joinable;

use std::fmt;
use std::marker::PhantomData;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

pub use discipline::{Discipline, Fifo, Lifo, PriorityOrder};
pub use joinable::JoinableQueue;

use crate::core::error::QueueFull;
use crate::core::SchedulerError;
use crate::timeout::Timeout;

/// LIFO queue.
pub type LifoQueue<T> = Queue<T, Lifo<T>>;

/// Priority queue of `(priority, value)` pairs, lowest priority first.
pub type PriorityQueue<P, V> = Queue<(P, V), PriorityOrder<P, V>>;

struct QueueInner<T, D> {
    items: Mutex<D>,
    maxsize: Option<usize>,
    not_empty: Notify,
    not_full: Notify,
    _item: PhantomData<fn() -> T>,
}

/// A cooperative queue, optionally bounded.
///
/// Blocked getters are woken as items arrive and blocked putters as space
/// frees up. Handles are cheap to clone and share one underlying queue.
pub struct Queue<T, D = Fifo<T>> {
    inner: Arc<QueueInner<T, D>>,
}

impl<T, D> Clone for Queue<T, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, D: Discipline<T> + Default> Default for Queue<T, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, D: Discipline<T>> fmt::Debug for Queue<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("qsize", &self.qsize())
            .field("maxsize", &self.inner.maxsize)
            .finish()
    }
}

impl<T, D: Discipline<T> + Default> Queue<T, D> {
    /// Create an unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        Self::with_maxsize(None)
    }

    /// Create a queue holding at most `maxsize` items; `0` means unbounded.
    #[must_use]
    pub fn bounded(maxsize: usize) -> Self {
        Self::with_maxsize(Some(maxsize))
    }

    /// Create a queue from an optional bound; `None` or `Some(0)` is unbounded.
    #[must_use]
    pub fn with_maxsize(maxsize: Option<usize>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                items: Mutex::new(D::default()),
                maxsize: maxsize.filter(|n| *n > 0),
                not_empty: Notify::new(),
                not_full: Notify::new(),
                _item: PhantomData,
            }),
        }
    }
}

impl<T, D: Discipline<T>> Queue<T, D> {
    /// Configured bound, `None` when unbounded.
    #[must_use]
    pub fn maxsize(&self) -> Option<usize> {
        self.inner.maxsize
    }

    /// Number of items currently stored.
    #[must_use]
    pub fn qsize(&self) -> usize {
        self.inner.items.lock().len()
    }

    /// Whether no items are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.qsize() == 0
    }

    /// Whether a bounded queue is at capacity. Always `false` when unbounded.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.inner
            .maxsize
            .is_some_and(|max| self.inner.items.lock().len() >= max)
    }

    /// Store `item` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] carrying the item back if the queue is full.
    pub fn put_nowait(&self, item: T) -> Result<(), QueueFull<T>> {
        let mut slot = Some(item);
        if self.try_push(&mut slot) {
            return Ok(());
        }
        match slot.take() {
            Some(item) => Err(QueueFull(item)),
            None => Ok(()),
        }
    }

    /// Store `item`, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] carrying the item back if `timeout` elapses first.
    pub async fn put(&self, item: T, timeout: Option<Duration>) -> Result<(), QueueFull<T>> {
        if timeout == Some(Duration::ZERO) {
            return self.put_nowait(item);
        }
        let mut slot = Some(item);
        let placed = Timeout::from_option(timeout)
            .run(self.put_waiting(&mut slot))
            .await
            .is_ok();
        match slot.take() {
            Some(item) if !placed => Err(QueueFull(item)),
            _ => Ok(()),
        }
    }

    /// Remove the next item without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::QueueEmpty`] if nothing is stored.
    pub fn get_nowait(&self) -> Result<T, SchedulerError> {
        self.try_pop().ok_or(SchedulerError::QueueEmpty)
    }

    /// Remove the next item, blocking while the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::QueueEmpty`] if `timeout` elapses first.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<T, SchedulerError> {
        if timeout == Some(Duration::ZERO) {
            return self.get_nowait();
        }
        Timeout::from_option(timeout)
            .run(self.get_waiting())
            .await
            .map_err(|_| SchedulerError::QueueEmpty)
    }

    fn try_push(&self, slot: &mut Option<T>) -> bool {
        {
            let mut items = self.inner.items.lock();
            if self.inner.maxsize.is_some_and(|max| items.len() >= max) {
                return false;
            }
            if let Some(item) = slot.take() {
                items.push(item);
            }
            trace!(qsize = items.len(), "Item queued");
        }
        self.inner.not_empty.notify_one();
        true
    }

    fn try_pop(&self) -> Option<T> {
        let item = self.inner.items.lock().pop()?;
        self.inner.not_full.notify_one();
        Some(item)
    }

    async fn put_waiting(&self, slot: &mut Option<T>) {
        loop {
            let mut notified = pin!(self.inner.not_full.notified());
            notified.as_mut().enable();
            if self.try_push(slot) {
                return;
            }
            notified.await;
        }
    }

    async fn get_waiting(&self) -> T {
        loop {
            let mut notified = pin!(self.inner.not_empty.notified());
            notified.as_mut().enable();
            if let Some(item) = self.try_pop() {
                return item;
            }
            notified.await;
        }
    }
}

impl<T: Clone, D: Discipline<T>> Queue<T, D> {
    /// The item the next get would return, without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::QueueEmpty`] if nothing is stored.
    pub fn peek_nowait(&self) -> Result<T, SchedulerError> {
        self.inner
            .items
            .lock()
            .peek()
            .cloned()
            .ok_or(SchedulerError::QueueEmpty)
    }
}
