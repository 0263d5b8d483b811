//! Objects a task unit can block on collectively.

use async_trait::async_trait;

/// Something that eventually becomes ready.
///
/// Used by [`crate::runtime::wait`] to block on heterogeneous collections of
/// task handles, events, async results, joinable queues and pools.
#[async_trait(?Send)]
pub trait Waitable {
    /// Whether the object is ready now.
    fn is_ready(&self) -> bool;

    /// Suspend until the object is ready.
    async fn wait_ready(&self);
}
