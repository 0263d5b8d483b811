//! Builders to construct pools from configuration.

use std::collections::HashMap;

use crate::config::{HubConfig, PoolConfig};
use crate::core::{Pool, SchedulerError};

/// Build every pool declared in the hub configuration, keyed by name.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidConfig`] if the configuration is invalid.
pub fn build_pools(cfg: &HubConfig) -> Result<HashMap<String, Pool>, SchedulerError> {
    cfg.validate()
        .map_err(|e| SchedulerError::InvalidConfig(format!("config invalid: {e}")))?;

    let mut pools = HashMap::with_capacity(cfg.pools.len());
    for (name, pool_cfg) in &cfg.pools {
        pools.insert(name.clone(), Pool::from_config(name.as_str(), pool_cfg)?);
    }
    Ok(pools)
}

/// Fluent builder for a single named pool.
#[derive(Debug, Clone)]
pub struct PoolBuilder {
    name: String,
    config: PoolConfig,
}

impl PoolBuilder {
    /// Start a builder for the pool `name`.
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pool configuration.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Override the capacity.
    #[must_use]
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Build the pool.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if the configuration is invalid.
    pub fn build(self) -> Result<Pool, SchedulerError> {
        Pool::from_config(self.name, &self.config)
    }
}
