//! Error types for scheduler operations.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::core::task::TaskId;
use crate::timeout::TimeoutExpired;

/// Errors produced by task units and synchronization primitives.
///
/// Every variant is cheap to clone so a single captured outcome can be
/// re-signalled to each retriever.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// The task body returned an error or panicked.
    #[error("task {id} failed: {reason}")]
    TaskFailed {
        /// Identifier of the failed task.
        id: TaskId,
        /// Captured failure.
        reason: Arc<anyhow::Error>,
    },
    /// The task was killed before it finished.
    #[error("task {id} was cancelled")]
    Cancelled {
        /// Identifier of the cancelled task.
        id: TaskId,
    },
    /// A value was read before the task or result had completed.
    #[error("result not ready")]
    NotReady,
    /// An error stored directly into an async result.
    #[error("{0}")]
    Failed(Arc<anyhow::Error>),
    /// A scoped deadline expired.
    #[error(transparent)]
    Timeout(#[from] TimeoutExpired),
    /// A non-blocking or timed get found the queue empty.
    #[error("queue empty")]
    QueueEmpty,
    /// A non-blocking or timed put found the queue full.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// `task_done` was called more times than items were put.
    #[error("task_done() called too many times")]
    TaskDoneUnderflow,
    /// An async result was resolved a second time.
    #[error("async result already resolved")]
    AlreadyResolved,
    /// The pool no longer accepts spawns.
    #[error("pool `{0}` is closed")]
    PoolClosed(String),
    /// One or more elements of a `Pool::map` call failed.
    #[error(transparent)]
    MapFailed(#[from] MapFailure),
    /// A bounded semaphore was released above its initial value.
    #[error("semaphore released too many times")]
    SemaphoreOverRelease,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The underlying runtime could not be built or a blocking job was lost.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl SchedulerError {
    /// Wrap an arbitrary error as the failure of task `id`.
    pub fn task_failed(id: TaskId, reason: impl Into<anyhow::Error>) -> Self {
        Self::TaskFailed {
            id,
            reason: Arc::new(reason.into()),
        }
    }

    /// Wrap an arbitrary error that is not tied to a task.
    pub fn failed(reason: impl Into<anyhow::Error>) -> Self {
        Self::Failed(Arc::new(reason.into()))
    }

    /// Whether this error is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether this error is a timeout expiry.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Aggregate failure of a `Pool::map` call, listing each failed input index.
#[derive(Debug, Clone, Error)]
pub struct MapFailure {
    /// Number of inputs submitted.
    pub total: usize,
    /// Failed inputs as `(index, error)`, ordered by index.
    pub failures: Vec<(usize, SchedulerError)>,
}

impl MapFailure {
    /// Indices of the failed inputs.
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        self.failures.iter().map(|(idx, _)| *idx).collect()
    }
}

impl fmt::Display for MapFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} map elements failed", self.failures.len(), self.total)?;
        if let Some((idx, err)) = self.failures.first() {
            write!(f, " (first: index {idx}: {err})")?;
        }
        Ok(())
    }
}

/// A rejected put: the queue was full. The item is handed back to the caller.
#[derive(Debug, Error)]
#[error("queue full")]
pub struct QueueFull<T>(pub T);

impl<T> QueueFull<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<QueueFull<T>> for SchedulerError {
    fn from(_: QueueFull<T>) -> Self {
        Self::QueueFull("item rejected".into())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
