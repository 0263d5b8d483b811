//! Queue with completion tracking.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{Discipline, Fifo, Queue};
use crate::core::error::QueueFull;
use crate::core::{SchedulerError, Waitable};
use crate::event::Event;

/// A [`Queue`] that counts unfinished items.
///
/// Every successful put increments the count and every
/// [`task_done`](JoinableQueue::task_done) decrements it. [`join`](JoinableQueue::join)
/// blocks until the count reaches zero.
pub struct JoinableQueue<T, D = Fifo<T>> {
    queue: Queue<T, D>,
    unfinished: Arc<Mutex<usize>>,
    finished: Event,
}

impl<T, D> Clone for JoinableQueue<T, D> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            unfinished: Arc::clone(&self.unfinished),
            finished: self.finished.clone(),
        }
    }
}

impl<T, D: Discipline<T> + Default> Default for JoinableQueue<T, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, D: Discipline<T>> fmt::Debug for JoinableQueue<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinableQueue")
            .field("queue", &self.queue)
            .field("unfinished", &self.unfinished_tasks())
            .finish()
    }
}

impl<T, D: Discipline<T> + Default> JoinableQueue<T, D> {
    /// Create an unbounded joinable queue.
    #[must_use]
    pub fn new() -> Self {
        Self::with_maxsize(None)
    }

    /// Create a joinable queue holding at most `maxsize` items; `0` means unbounded.
    #[must_use]
    pub fn bounded(maxsize: usize) -> Self {
        Self::with_maxsize(Some(maxsize))
    }

    /// Create a joinable queue from an optional bound.
    #[must_use]
    pub fn with_maxsize(maxsize: Option<usize>) -> Self {
        let finished = Event::new();
        finished.set();
        Self {
            queue: Queue::with_maxsize(maxsize),
            unfinished: Arc::new(Mutex::new(0)),
            finished,
        }
    }
}

impl<T, D: Discipline<T>> JoinableQueue<T, D> {
    /// Number of items put but not yet marked done.
    #[must_use]
    pub fn unfinished_tasks(&self) -> usize {
        *self.unfinished.lock()
    }

    /// Store `item` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] carrying the item back if the queue is full.
    pub fn put_nowait(&self, item: T) -> Result<(), QueueFull<T>> {
        self.queue.put_nowait(item)?;
        self.add_unfinished();
        Ok(())
    }

    /// Store `item`, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] carrying the item back if `timeout` elapses first.
    pub async fn put(&self, item: T, timeout: Option<Duration>) -> Result<(), QueueFull<T>> {
        self.queue.put(item, timeout).await?;
        self.add_unfinished();
        Ok(())
    }

    /// Remove the next item without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::QueueEmpty`] if nothing is stored.
    pub fn get_nowait(&self) -> Result<T, SchedulerError> {
        self.queue.get_nowait()
    }

    /// Remove the next item, blocking while the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::QueueEmpty`] if `timeout` elapses first.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<T, SchedulerError> {
        self.queue.get(timeout).await
    }

    /// Number of items currently stored.
    #[must_use]
    pub fn qsize(&self) -> usize {
        self.queue.qsize()
    }

    /// Whether no items are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether a bounded queue is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Configured bound, `None` when unbounded.
    #[must_use]
    pub fn maxsize(&self) -> Option<usize> {
        self.queue.maxsize()
    }

    /// Mark one previously retrieved item as fully processed.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::TaskDoneUnderflow`] if called more times than
    /// items were put.
    pub fn task_done(&self) -> Result<(), SchedulerError> {
        let remaining = {
            let mut unfinished = self.unfinished.lock();
            if *unfinished == 0 {
                warn!("task_done() called with no unfinished items");
                return Err(SchedulerError::TaskDoneUnderflow);
            }
            *unfinished -= 1;
            *unfinished
        };
        if remaining == 0 {
            debug!("All queued items processed");
            self.finished.set();
        }
        Ok(())
    }

    /// Block until every put item has been marked done or `timeout` elapses.
    ///
    /// Returns `true` when the unfinished count reached zero.
    pub async fn join(&self, timeout: Option<Duration>) -> bool {
        self.finished.wait(timeout).await
    }

    fn add_unfinished(&self) {
        let mut unfinished = self.unfinished.lock();
        *unfinished += 1;
        self.finished.clear();
    }
}

impl<T: Clone, D: Discipline<T>> JoinableQueue<T, D> {
    /// The item the next get would return, without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::QueueEmpty`] if nothing is stored.
    pub fn peek_nowait(&self) -> Result<T, SchedulerError> {
        self.queue.peek_nowait()
    }
}

#[async_trait(?Send)]
impl<T, D: Discipline<T>> Waitable for JoinableQueue<T, D> {
    fn is_ready(&self) -> bool {
        self.unfinished_tasks() == 0
    }

    async fn wait_ready(&self) {
        self.finished.wait_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{sleep, spawn, Hub};

    #[test]
    fn test_task_done_underflow() {
        let q: JoinableQueue<u8> = JoinableQueue::new();
        assert!(matches!(q.task_done(), Err(SchedulerError::TaskDoneUnderflow)));
        q.put_nowait(1).unwrap();
        q.get_nowait().unwrap();
        q.task_done().unwrap();
        assert_eq!(q.unfinished_tasks(), 0);
    }

    #[test]
    fn test_join_on_empty_returns_immediately() {
        let hub = Hub::new().unwrap();
        let q: JoinableQueue<u8> = JoinableQueue::new();
        assert!(hub.block_on(q.join(Some(Duration::ZERO))));
    }

    #[test]
    fn test_join_waits_for_workers() {
        let hub = Hub::new().unwrap();
        let q: JoinableQueue<u32> = JoinableQueue::new();
        let processed = Arc::new(Mutex::new(Vec::new()));
        hub.block_on(async {
            for i in 0..5 {
                q.put_nowait(i).unwrap();
            }
            assert_eq!(q.unfinished_tasks(), 5);
            for _ in 0..2 {
                let q = q.clone();
                let processed = Arc::clone(&processed);
                spawn(async move {
                    while let Ok(item) = q.get(Some(Duration::from_millis(50))).await {
                        sleep(Duration::from_millis(1)).await;
                        processed.lock().push(item);
                        q.task_done()?;
                    }
                    Ok::<_, anyhow::Error>(())
                });
            }
            assert!(q.join(Some(Duration::from_secs(2))).await);
        });
        let mut processed = processed.lock().clone();
        processed.sort_unstable();
        assert_eq!(processed, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_join_times_out_with_unfinished_items() {
        let hub = Hub::new().unwrap();
        let q: JoinableQueue<u8> = JoinableQueue::new();
        q.put_nowait(9).unwrap();
        assert!(!hub.block_on(q.join(Some(Duration::from_millis(10)))));
        assert!(!q.is_ready());
    }
}
