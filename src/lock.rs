//! Cooperative semaphore and lock.
//!
//! Waiters are admitted strictly in arrival order. A permit released while
//! others are queued is handed directly to the oldest waiter, so a late
//! arrival can never overtake a queued one.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{trace, warn};

use crate::core::SchedulerError;
use crate::timeout::Timeout;

#[derive(Debug)]
struct SemState {
    permits: usize,
    initial: usize,
    bounded: bool,
    next_ticket: u64,
    queue: VecDeque<u64>,
    // Tickets handed a permit that have not picked it up yet.
    granted: HashSet<u64>,
}

#[derive(Debug)]
struct SemInner {
    state: Mutex<SemState>,
    notify: Notify,
}

/// A counting semaphore with FIFO admission.
#[derive(Debug, Clone)]
pub struct Semaphore {
    inner: Arc<SemInner>,
}

impl Semaphore {
    /// Create a semaphore with `permits` free permits.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self::build(permits, false)
    }

    /// Create a semaphore that rejects releases above its initial value.
    #[must_use]
    pub fn bounded(permits: usize) -> Self {
        Self::build(permits, true)
    }

    fn build(permits: usize, bounded: bool) -> Self {
        Self {
            inner: Arc::new(SemInner {
                state: Mutex::new(SemState {
                    permits,
                    initial: permits,
                    bounded,
                    next_ticket: 0,
                    queue: VecDeque::new(),
                    granted: HashSet::new(),
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Number of free permits.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.state.lock().permits
    }

    /// Number of queued waiters.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether no permit is free.
    #[must_use]
    pub fn locked(&self) -> bool {
        self.available() == 0
    }

    /// Take a permit without blocking.
    ///
    /// Fails while other waiters are queued, even if a permit is free.
    #[must_use]
    pub fn try_acquire(&self) -> Option<Permit> {
        let mut state = self.inner.state.lock();
        if state.permits > 0 && state.queue.is_empty() {
            state.permits -= 1;
            drop(state);
            return Some(Permit::new(self.clone()));
        }
        None
    }

    /// Block until a permit is granted or `timeout` elapses.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Option<Permit> {
        let ticket = self.reserve();
        Timeout::from_option(timeout).run(ticket.admit()).await.ok()
    }

    /// Return a permit obtained through [`Permit::forget`].
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::SemaphoreOverRelease`] if this is a bounded
    /// semaphore and every permit is already free.
    pub fn release(&self) -> Result<(), SchedulerError> {
        {
            let state = self.inner.state.lock();
            if state.bounded && state.queue.is_empty() && state.permits >= state.initial {
                warn!(permits = state.permits, "Semaphore released too many times");
                return Err(SchedulerError::SemaphoreOverRelease);
            }
        }
        self.release_slot();
        Ok(())
    }

    /// Block until at least one permit is free, without taking it.
    pub async fn wait_available(&self, timeout: Option<Duration>) -> bool {
        Timeout::from_option(timeout)
            .run(async {
                loop {
                    let mut notified = pin!(self.inner.notify.notified());
                    notified.as_mut().enable();
                    if self.available() > 0 {
                        return;
                    }
                    notified.await;
                }
            })
            .await
            .is_ok()
    }

    /// Claim a place in line synchronously.
    ///
    /// The ticket is granted at once when a permit is free and nobody is
    /// queued; otherwise it joins the back of the queue.
    pub(crate) fn reserve(&self) -> Ticket {
        let mut state = self.inner.state.lock();
        if state.permits > 0 && state.queue.is_empty() {
            state.permits -= 1;
            return Ticket {
                sem: self.clone(),
                id: None,
                claimed: false,
            };
        }
        let id = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(id);
        trace!(ticket = id, queued = state.queue.len(), "Semaphore waiter queued");
        Ticket {
            sem: self.clone(),
            id: Some(id),
            claimed: false,
        }
    }

    fn release_slot(&self) {
        {
            let mut state = self.inner.state.lock();
            if let Some(next) = state.queue.pop_front() {
                state.granted.insert(next);
            } else {
                state.permits += 1;
            }
        }
        self.inner.notify.notify_waiters();
    }
}

/// A place in a semaphore's admission line.
pub(crate) struct Ticket {
    sem: Semaphore,
    // `None` when the permit was granted at reservation time.
    id: Option<u64>,
    claimed: bool,
}

impl Ticket {
    pub(crate) const fn is_granted(&self) -> bool {
        self.id.is_none()
    }

    /// Wait for this ticket's turn and convert it into a permit.
    pub(crate) async fn admit(mut self) -> Permit {
        let Some(id) = self.id else {
            self.claimed = true;
            return Permit::new(self.sem.clone());
        };
        loop {
            let mut notified = pin!(self.sem.inner.notify.notified());
            notified.as_mut().enable();
            if self.sem.inner.state.lock().granted.remove(&id) {
                self.claimed = true;
                return Permit::new(self.sem.clone());
            }
            notified.await;
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.claimed {
            return;
        }
        let Some(id) = self.id else {
            self.sem.release_slot();
            return;
        };
        let handed_over = {
            let mut state = self.sem.inner.state.lock();
            if let Some(pos) = state.queue.iter().position(|queued| *queued == id) {
                state.queue.remove(pos);
                false
            } else {
                state.granted.remove(&id)
            }
        };
        if handed_over {
            self.sem.release_slot();
        }
    }
}

/// A held semaphore permit, returned when dropped.
pub struct Permit {
    sem: Semaphore,
    active: bool,
}

impl Permit {
    const fn new(sem: Semaphore) -> Self {
        Self { sem, active: true }
    }

    /// Keep the permit taken without returning it on drop.
    ///
    /// Use [`Semaphore::release`] to give it back later.
    pub fn forget(mut self) {
        self.active = false;
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit").field("active", &self.active).finish()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if self.active {
            self.sem.release_slot();
        }
    }
}

/// Mutual exclusion between task units.
#[derive(Debug, Clone)]
pub struct Lock {
    sem: Semaphore,
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock {
    /// Create an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sem: Semaphore::bounded(1),
        }
    }

    /// Block until the lock is held.
    pub async fn lock(&self) -> LockGuard {
        LockGuard {
            _permit: self.sem.reserve().admit().await,
        }
    }

    /// Block until the lock is held or `timeout` elapses.
    pub async fn lock_timeout(&self, timeout: Duration) -> Option<LockGuard> {
        self.sem
            .acquire(Some(timeout))
            .await
            .map(|permit| LockGuard { _permit: permit })
    }

    /// Take the lock without blocking.
    #[must_use]
    pub fn try_lock(&self) -> Option<LockGuard> {
        self.sem
            .try_acquire()
            .map(|permit| LockGuard { _permit: permit })
    }

    /// Whether the lock is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.sem.locked()
    }
}

/// Holds a [`Lock`] until dropped.
#[derive(Debug)]
pub struct LockGuard {
    _permit: Permit,
}
