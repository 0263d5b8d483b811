//! Lazily consumed results of a pool-wide map.
//!
//! Input is pulled by a feeder unit, one item per free pool slot, and never
//! more than the pool's capacity ahead of the consumer. Infinite sources are
//! therefore fine as long as the consumer stops pulling results.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::Stream;
use tracing::debug;

use crate::core::pool::Pool;
use crate::core::task::{TaskBuilder, TaskHandle};
use crate::core::SchedulerError;
use crate::lock::Semaphore;
use crate::queue::Queue;

enum Entry<T> {
    Finished(usize, TaskHandle<T>),
    Rejected(usize, SchedulerError),
    // The feeder stopped after submitting this many items.
    Exhausted(usize),
}

/// Results of [`Pool::imap`] or [`Pool::imap_unordered`].
///
/// Results are pulled with [`IMap::next`] or consumed as a [`Stream`] via
/// [`IMap::into_stream`]. The ordered variant buffers out-of-order
/// completions until their turn. Dropping the `IMap` stops the feeder;
/// members already submitted keep running.
pub struct IMap<T> {
    entries: Queue<Entry<T>>,
    buffered: HashMap<usize, Result<T, SchedulerError>>,
    window: Semaphore,
    feeder: TaskHandle<()>,
    ordered: bool,
    next_index: usize,
    total: Option<usize>,
    yielded: usize,
}

impl<T> fmt::Debug for IMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IMap")
            .field("ordered", &self.ordered)
            .field("total", &self.total)
            .field("yielded", &self.yielded)
            .finish()
    }
}

impl<T: Send + 'static> IMap<T> {
    pub(crate) fn start<I, F, Fut>(pool: &Pool, items: I, mut f: F, ordered: bool) -> Self
    where
        I: IntoIterator,
        I::IntoIter: 'static,
        F: FnMut(I::Item) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
    {
        let entries: Queue<Entry<T>> = Queue::new();
        let window = Semaphore::new(pool.capacity());
        let submitted = Arc::new(AtomicUsize::new(0));

        let feeder = {
            let pool = pool.clone();
            let sink = entries.clone();
            let window = window.clone();
            let submitted = Arc::clone(&submitted);
            let mut items = items.into_iter();
            TaskBuilder::new().name("imap-feeder").spawn(async move {
                let mut index = 0;
                loop {
                    let Some(credit) = window.acquire(None).await else {
                        break;
                    };
                    credit.forget();
                    pool.wait_available(None).await;
                    let Some(item) = items.next() else {
                        break;
                    };
                    match pool.spawn(f(item)) {
                        Ok(member) => {
                            let member_sink = sink.clone();
                            let handle = member.clone();
                            member.on_finish(move |_| {
                                // Unbounded: never rejects.
                                let _ = member_sink.put_nowait(Entry::Finished(index, handle));
                            });
                        }
                        Err(err) => {
                            let _ = sink.put_nowait(Entry::Rejected(index, err));
                            submitted.store(index + 1, Ordering::Release);
                            break;
                        }
                    }
                    index += 1;
                    submitted.store(index, Ordering::Release);
                }
                debug!(pool = %pool.name(), submitted = index, "Map input exhausted");
                Ok::<_, anyhow::Error>(())
            })
        };
        let sink = entries.clone();
        feeder.on_finish(move |_| {
            let _ = sink.put_nowait(Entry::Exhausted(submitted.load(Ordering::Acquire)));
        });

        Self {
            entries,
            buffered: HashMap::new(),
            window,
            feeder,
            ordered,
            next_index: 0,
            total: None,
            yielded: 0,
        }
    }
}

impl<T> IMap<T> {
    /// Number of submitted elements, known once the input is exhausted.
    #[must_use]
    pub const fn total(&self) -> Option<usize> {
        self.total
    }

    /// Number of results yielded so far.
    #[must_use]
    pub const fn yielded(&self) -> usize {
        self.yielded
    }

    /// Wait for the next result; `None` once every result has been yielded.
    pub async fn next(&mut self) -> Option<Result<T, SchedulerError>> {
        loop {
            if let Some(outcome) = self.pop_buffered() {
                self.yielded += 1;
                let _ = self.window.release();
                return Some(outcome);
            }
            if self.total.is_some_and(|total| self.yielded >= total) {
                return None;
            }
            match self.entries.get(None).await.ok()? {
                Entry::Finished(index, handle) => {
                    self.buffered.insert(index, handle.take_outcome());
                }
                Entry::Rejected(index, err) => {
                    self.buffered.insert(index, Err(err));
                }
                Entry::Exhausted(total) => self.total = Some(total),
            }
        }
    }

    fn pop_buffered(&mut self) -> Option<Result<T, SchedulerError>> {
        if self.ordered {
            let outcome = self.buffered.remove(&self.next_index)?;
            self.next_index += 1;
            return Some(outcome);
        }
        let index = *self.buffered.keys().next()?;
        self.buffered.remove(&index)
    }

    /// Consume the results as a stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, SchedulerError>> {
        futures::stream::unfold(self, |mut results| async move {
            let item = results.next().await?;
            Some((item, results))
        })
    }
}

impl<T> Drop for IMap<T> {
    fn drop(&mut self) {
        self.feeder.kill();
    }
}
