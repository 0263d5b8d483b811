//! The hub: a single-threaded cooperative scheduler.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::LocalSet;
use tracing::{debug, info};

use crate::builders::build_pools;
use crate::config::HubConfig;
use crate::core::task::{TaskBuilder, TaskHandle};
use crate::core::{Pool, SchedulerError};
use crate::runtime::context;

static NEXT_HUB_ID: AtomicU64 = AtomicU64::new(1);

/// Owns the event loop and run queue for one OS thread.
///
/// Task units spawned while the hub is driving (or queued on it beforehand)
/// run only while [`Hub::block_on`] is executing. At most one task unit makes
/// progress at a time and control changes hands only at suspension points.
pub struct Hub {
    id: u64,
    // Dropped before the runtime so pending units unwind with timers alive.
    local: LocalSet,
    runtime: tokio::runtime::Runtime,
    config: HubConfig,
}

impl Hub {
    /// Create a hub with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Runtime`] if the event loop cannot be built.
    pub fn new() -> Result<Self, SchedulerError> {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub from a validated [`HubConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if validation fails, or
    /// [`SchedulerError::Runtime`] if the event loop cannot be built.
    pub fn with_config(config: HubConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .max_blocking_threads(config.max_blocking_threads)
            .event_interval(config.event_interval)
            .build()
            .map_err(|e| SchedulerError::Runtime(format!("failed to build event loop: {e}")))?;
        let id = NEXT_HUB_ID.fetch_add(1, Ordering::Relaxed);
        info!(
            hub_id = id,
            max_blocking_threads = config.max_blocking_threads,
            event_interval = config.event_interval,
            "Hub created"
        );
        Ok(Self {
            id,
            local: LocalSet::new(),
            runtime,
            config,
        })
    }

    /// Unique identifier of this hub.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Configuration the hub was built with.
    #[must_use]
    pub const fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Drive the scheduler until `fut` completes and return its output.
    ///
    /// Task units that are still pending when `fut` completes stay queued and
    /// resume the next time the hub is driven.
    ///
    /// # Panics
    ///
    /// Panics if called from within a task unit running on any hub.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        let _guard = context::enter_hub();
        debug!(hub_id = self.id, "Hub entered");
        self.local.block_on(&self.runtime, fut)
    }

    /// Spawn a task unit on this hub.
    ///
    /// The unit starts the next time the hub is driven.
    pub fn spawn<F, T>(&self, fut: F) -> TaskHandle<T>
    where
        F: Future<Output = anyhow::Result<T>> + 'static,
        T: 'static,
    {
        TaskBuilder::new().spawn_on(self, fut)
    }

    /// Build the pools declared in this hub's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if a pool entry is invalid.
    pub fn build_pools(&self) -> Result<std::collections::HashMap<String, Pool>, SchedulerError> {
        build_pools(&self.config)
    }

    pub(crate) fn spawn_detached<F>(&self, fut: F)
    where
        F: Future<Output = ()> + 'static,
    {
        drop(self.local.spawn_local(fut));
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
