//! One-shot broadcast flag.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::core::Waitable;
use crate::timeout::Timeout;

#[derive(Debug, Default)]
struct EventInner {
    flag: AtomicBool,
    // Bumped on every unset -> set transition.
    generation: AtomicU64,
    notify: Notify,
}

/// A boolean flag that wakes every waiter when set.
///
/// Waiters blocked at the moment [`Event::set`] runs are released even if the
/// event is cleared again before they resume.
#[derive(Debug, Clone, Default)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    /// Create an unset event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake all current waiters. Idempotent.
    pub fn set(&self) {
        if self.inner.flag.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.notify.notify_waiters();
    }

    /// Reset the flag. Later waiters block until the next `set`.
    pub fn clear(&self) {
        self.inner.flag.store(false, Ordering::Release);
    }

    /// Whether the flag is set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Block until the flag is set or `timeout` elapses.
    ///
    /// Returns `true` if the event was set, `false` on timeout. Returns
    /// immediately when already set.
    pub async fn wait(&self, timeout: Option<Duration>) -> bool {
        if self.is_set() {
            return true;
        }
        Timeout::from_option(timeout)
            .run(self.until_set())
            .await
            .is_ok()
    }

    async fn until_set(&self) {
        let seen = self.inner.generation.load(Ordering::Acquire);
        loop {
            let mut notified = pin!(self.inner.notify.notified());
            notified.as_mut().enable();
            if self.is_set() || self.inner.generation.load(Ordering::Acquire) != seen {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait(?Send)]
impl Waitable for Event {
    fn is_ready(&self) -> bool {
        self.is_set()
    }

    async fn wait_ready(&self) {
        self.until_set().await;
    }
}
