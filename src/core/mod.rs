//! Task units, pools and the errors they report.

pub mod error;
pub mod imap;
pub mod pool;
pub mod task;
pub mod waitable;

pub use error::{AppResult, MapFailure, QueueFull, SchedulerError};
pub use imap::IMap;
pub use pool::{Pool, PoolStats};
pub use task::{spawn, spawn_later, TaskBuilder, TaskHandle, TaskId, TaskState};
pub use waitable::Waitable;
