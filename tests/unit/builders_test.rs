//! Tests for builder modules

use tasklet::builders::{build_pools, PoolBuilder};
use tasklet::config::{HubConfig, PoolConfig};
use tasklet::{Hub, SchedulerError};

#[test]
fn test_pool_builder_defaults() {
    let builder = PoolBuilder::new("pool1", PoolConfig::new(5));
    assert_eq!(builder.name(), "pool1");
    assert_eq!(builder.config().capacity, 5);

    let pool = builder.capacity(2).build().unwrap();
    assert_eq!(pool.name(), "pool1");
    assert_eq!(pool.capacity(), 2);
    assert_eq!(pool.free_count(), 2);
    assert!(pool.is_empty());
}

#[test]
fn test_pool_builder_rejects_zero_capacity() {
    let res = PoolBuilder::new("empty", PoolConfig::new(1)).capacity(0).build();
    assert!(matches!(res, Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn test_build_pools_from_config() {
    let cfg = HubConfig::default()
        .with_pool("fetch", PoolConfig::new(10))
        .with_pool("parse", PoolConfig::new(2));
    let pools = build_pools(&cfg).unwrap();
    assert_eq!(pools.len(), 2);
    assert_eq!(pools["fetch"].capacity(), 10);
    assert_eq!(pools["parse"].name(), "parse");
}

#[test]
fn test_hub_builds_its_pools() {
    let cfg = HubConfig::default().with_pool("workers", PoolConfig::new(3));
    let hub = Hub::with_config(cfg).unwrap();
    let pools = hub.build_pools().unwrap();
    assert_eq!(pools["workers"].capacity(), 3);
}
