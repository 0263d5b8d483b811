//! Hub configuration and its loaders.

use std::collections::HashMap;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PoolConfig;
use crate::core::AppResult;

/// Environment variable overriding [`HubConfig::max_blocking_threads`].
pub const ENV_MAX_BLOCKING_THREADS: &str = "TASKLET_MAX_BLOCKING_THREADS";
/// Environment variable overriding [`HubConfig::event_interval`].
pub const ENV_EVENT_INTERVAL: &str = "TASKLET_EVENT_INTERVAL";
/// Environment variable holding named pools as a JSON object.
pub const ENV_POOLS: &str = "TASKLET_POOLS";

const DEFAULT_EVENT_INTERVAL: u32 = 61;

fn default_max_blocking_threads() -> usize {
    num_cpus::get()
}

const fn default_event_interval() -> u32 {
    DEFAULT_EVENT_INTERVAL
}

/// Root hub configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Named pools built by [`crate::builders::build_pools`].
    #[serde(default)]
    pub pools: HashMap<String, PoolConfig>,
    /// Helper threads available to `run_blocking`.
    #[serde(default = "default_max_blocking_threads")]
    pub max_blocking_threads: usize,
    /// Scheduler ticks between I/O and timer polls.
    #[serde(default = "default_event_interval")]
    pub event_interval: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            pools: HashMap::new(),
            max_blocking_threads: default_max_blocking_threads(),
            event_interval: DEFAULT_EVENT_INTERVAL,
        }
    }
}

impl HubConfig {
    /// Add a named pool.
    #[must_use]
    pub fn with_pool(mut self, name: impl Into<String>, pool: PoolConfig) -> Self {
        self.pools.insert(name.into(), pool);
        self
    }

    /// Set the number of blocking helper threads.
    #[must_use]
    pub const fn with_max_blocking_threads(mut self, threads: usize) -> Self {
        self.max_blocking_threads = threads;
        self
    }

    /// Set the scheduler event interval.
    #[must_use]
    pub const fn with_event_interval(mut self, interval: u32) -> Self {
        self.event_interval = interval;
        self
    }

    /// Validate hub settings and every pool.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_blocking_threads == 0 {
            return Err("max_blocking_threads must be greater than 0".into());
        }
        if self.event_interval == 0 {
            return Err("event_interval must be greater than 0".into());
        }
        for (name, pool) in &self.pools {
            pool.validate()
                .map_err(|e| format!("pool `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse hub configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the environment, reading a `.env` file first
    /// if one exists.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Fails if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> AppResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub(crate) fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(raw) = lookup(ENV_MAX_BLOCKING_THREADS) {
            cfg.max_blocking_threads = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_BLOCKING_THREADS}={raw}"))?;
        }
        if let Some(raw) = lookup(ENV_EVENT_INTERVAL) {
            cfg.event_interval = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_EVENT_INTERVAL}={raw}"))?;
        }
        if let Some(raw) = lookup(ENV_POOLS) {
            cfg.pools = serde_json::from_str(&raw).with_context(|| format!("{ENV_POOLS} is not valid JSON"))?;
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_overrides_defaults() {
        let cfg = HubConfig::from_lookup(|key| match key {
            ENV_MAX_BLOCKING_THREADS => Some("3".into()),
            ENV_POOLS => Some(r#"{"io": {"capacity": 8}}"#.into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.max_blocking_threads, 3);
        assert_eq!(cfg.event_interval, 61);
        assert_eq!(cfg.pools["io"].capacity, 8);
    }

    #[test]
    fn test_lookup_rejects_bad_number() {
        let err = HubConfig::from_lookup(|key| {
            (key == ENV_EVENT_INTERVAL).then(|| "often".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains(ENV_EVENT_INTERVAL));
    }

    #[test]
    fn test_lookup_rejects_invalid_pool() {
        let err = HubConfig::from_lookup(|key| {
            (key == ENV_POOLS).then(|| r#"{"empty": {"capacity": 0}}"#.to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("capacity"));
    }
}
