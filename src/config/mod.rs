//! Configuration models for the hub and its pools.

pub mod hub;
pub mod pool;

pub use hub::HubConfig;
pub use pool::PoolConfig;
