//! # Tasklet
//!
//! Cooperative task scheduling for Rust: lightweight task units multiplexed
//! on a single-threaded hub, with the synchronization primitives needed to
//! coordinate them.
//!
//! At most one task unit runs at a time on a hub, and control changes hands
//! only at suspension points (sleeping, waiting on a queue, event, result,
//! lock or another unit, or network I/O). Code between two suspension points
//! runs atomically with respect to every other unit on the same hub.
//!
//! ## Key Features
//!
//! - **Task units**: spawn, join, kill, link callbacks, delayed start
//! - **Pools**: cap concurrency; spawning into a full pool queues the unit
//!   instead of blocking the caller; `map`, `imap`, `imap_unordered`
//! - **Queues**: FIFO, LIFO, priority and joinable variants, bounded or not
//! - **Event and `AsyncResult`**: broadcast flags and single-assignment results
//! - **Timeouts**: scoped deadlines that nest correctly
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tasklet::{run, sleep, spawn, Pool, Queue};
//!
//! run(async {
//!     let pool = Pool::new(3)?;
//!     let queue: Queue<u32> = Queue::bounded(10);
//!     let producer = {
//!         let queue = queue.clone();
//!         spawn(async move {
//!             for i in 0..10 {
//!                 queue.put(i, None).await?;
//!             }
//!             Ok(())
//!         })
//!     };
//!     let total = pool
//!         .map(0..10, move |_| {
//!             let queue = queue.clone();
//!             async move { Ok(queue.get(None).await? * 2) }
//!         })
//!         .await?;
//!     producer.join(None).await;
//!     sleep(Duration::ZERO).await;
//!     Ok::<_, anyhow::Error>(total.iter().sum::<u32>())
//! })??;
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Task units, pools, and the error model.
pub mod core;
/// Configuration models for the hub and its pools.
pub mod config;
/// Builders to construct pools from configuration.
pub mod builders;
/// Hub runtime and scheduler-level operations.
pub mod runtime;
/// FIFO, LIFO, priority and joinable queues.
pub mod queue;
/// Broadcast event flag.
pub mod event;
/// Single-assignment result cell.
pub mod async_result;
/// Scoped deadlines.
pub mod timeout;
/// Semaphore and lock.
pub mod lock;
/// Shared utilities.
pub mod util;

pub use crate::async_result::AsyncResult;
pub use crate::config::{HubConfig, PoolConfig};
pub use crate::core::{
    AppResult, IMap, MapFailure, Pool, PoolStats, QueueFull, SchedulerError, TaskBuilder,
    TaskHandle, TaskId, TaskState, Waitable,
};
pub use crate::event::Event;
pub use crate::lock::{Lock, LockGuard, Permit, Semaphore};
pub use crate::queue::{JoinableQueue, LifoQueue, PriorityQueue, Queue};
pub use crate::runtime::{
    current_task_id, join_all, run, run_blocking, sleep, spawn, spawn_later, wait, Hub,
    JoinOptions,
};
pub use crate::timeout::{with_timeout, Timeout, TimeoutExpired};
pub use crate::util::init_tracing;
