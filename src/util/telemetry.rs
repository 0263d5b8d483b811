//! Telemetry helpers for structured logging and tracing.
//!
//! The scheduler emits `tracing` events with structured fields (`task_id`,
//! `pool`, `hub_id`, `timeout_id`). Every task unit runs inside a `task`
//! span, so events from user code are tagged with the unit that produced them.

use tracing_subscriber::EnvFilter;

/// Default filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "tasklet=info";

/// Initialize tracing. Users can install their own subscriber; this helper
/// installs a default env-based subscriber if none is set.
pub fn init_tracing() {
    init_tracing_with_filter(DEFAULT_FILTER);
}

/// Initialize tracing with `fallback` as the filter when `RUST_LOG` is unset.
pub fn init_tracing_with_filter(fallback: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
