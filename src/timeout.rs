//! Scoped deadlines.
//!
//! A [`Timeout`] is armed when [`Timeout::run`] starts polling the wrapped
//! future and disarmed when that call returns, whichever way it returns. The
//! wrapped future is always polled before the deadline is checked, so an
//! operation that finishes on the same scheduler pass as the deadline wins.
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tasklet::{sleep, Timeout};
//!
//! let outer = Timeout::new(Duration::from_secs(1));
//! let inner = Timeout::new(Duration::from_millis(10));
//! let res = outer.run(inner.run(sleep(Duration::from_secs(5)))).await;
//! // the inner scope expired; the outer scope completed normally
//! assert!(matches!(res, Ok(Err(ref e)) if e.is(&inner)));
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

static NEXT_TIMEOUT_ID: AtomicU64 = AtomicU64::new(1);

/// Default expiry signal raised by a [`Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("timeout {id} expired after {duration:?}")]
pub struct TimeoutExpired {
    /// Identifier of the timeout that fired.
    pub id: u64,
    /// Configured duration of the timeout.
    pub duration: Duration,
}

impl TimeoutExpired {
    /// Whether this expiry was raised by `timeout`.
    #[must_use]
    pub const fn is<E>(&self, timeout: &Timeout<E>) -> bool {
        self.id == timeout.id
    }
}

/// A scoped deadline that interrupts the wrapped suspension point on expiry.
///
/// `E` is the error produced when the deadline fires; it defaults to
/// [`TimeoutExpired`] and can be replaced with [`Timeout::with_error`].
#[derive(Debug, Clone)]
pub struct Timeout<E = TimeoutExpired> {
    id: u64,
    duration: Option<Duration>,
    error: E,
}

impl Timeout<TimeoutExpired> {
    /// Create a timeout that fires `duration` after its scope is entered.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        let id = NEXT_TIMEOUT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            duration: Some(duration),
            error: TimeoutExpired { id, duration },
        }
    }

    /// Create a timeout from an optional duration; `None` never fires.
    #[must_use]
    pub fn from_option(duration: Option<Duration>) -> Self {
        duration.map_or_else(Self::never, Self::new)
    }

    /// A timeout that never fires.
    #[must_use]
    pub fn never() -> Self {
        let id = NEXT_TIMEOUT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            duration: None,
            error: TimeoutExpired {
                id,
                duration: Duration::MAX,
            },
        }
    }
}

impl<E> Timeout<E> {
    /// Replace the expiry signal with a custom error value.
    pub fn with_error<F>(self, error: F) -> Timeout<F> {
        Timeout {
            id: self.id,
            duration: self.duration,
            error,
        }
    }

    /// Unique identifier of this timeout.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Configured duration, `None` when the timeout never fires.
    #[must_use]
    pub const fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Run `fut` inside this timeout's scope.
    ///
    /// Returns `Ok` with the future's output if it completes first, or `Err`
    /// with this timeout's expiry signal. The timer does not outlive the call.
    ///
    /// # Errors
    ///
    /// Returns the configured expiry error when the deadline passes first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, E>
    where
        F: Future,
        E: Clone,
    {
        let Some(duration) = self.duration else {
            return Ok(fut.await);
        };
        match tokio::time::timeout(duration, fut).await {
            Ok(output) => Ok(output),
            Err(_) => {
                tracing::debug!(timeout_id = self.id, ?duration, "Timeout expired");
                Err(self.error.clone())
            }
        }
    }
}

/// Run `fut` with a deadline of `duration`.
///
/// # Errors
///
/// Returns [`TimeoutExpired`] if `fut` has not completed when the deadline passes.
pub async fn with_timeout<F>(duration: Duration, fut: F) -> Result<F::Output, TimeoutExpired>
where
    F: Future,
{
    Timeout::new(duration).run(fut).await
}
