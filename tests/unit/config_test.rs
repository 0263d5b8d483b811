//! Tests for configuration validation

use tasklet::config::{HubConfig, PoolConfig};

#[test]
fn test_pool_config_validation() {
    let valid = PoolConfig::new(4);
    assert!(valid.validate().is_ok());
}

#[test]
fn test_pool_config_invalid_capacity() {
    let invalid = PoolConfig::new(8).with_capacity(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_default_is_valid() {
    assert!(PoolConfig::default().validate().is_ok());
}

#[test]
fn test_hub_config_from_json() {
    let json = r#"
    {
        "max_blocking_threads": 2,
        "pools": {
            "crawler": { "capacity": 20 },
            "db": { "capacity": 4 }
        }
    }
    "#;
    let cfg = HubConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.max_blocking_threads, 2);
    assert_eq!(cfg.event_interval, 61);
    assert_eq!(cfg.pools.len(), 2);
    assert_eq!(cfg.pools["crawler"].capacity, 20);
}

#[test]
fn test_hub_config_rejects_invalid_pool() {
    let json = r#"{ "pools": { "broken": { "capacity": 0 } } }"#;
    let err = HubConfig::from_json_str(json).unwrap_err();
    assert!(err.contains("broken"));
}

#[test]
fn test_hub_config_rejects_malformed_json() {
    let err = HubConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_hub_config_builder_methods() {
    let cfg = HubConfig::default()
        .with_pool("io", PoolConfig::new(3))
        .with_max_blocking_threads(1)
        .with_event_interval(31);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.pools["io"].capacity, 3);

    let zero = HubConfig::default().with_event_interval(0);
    assert!(zero.validate().is_err());
}

#[test]
fn test_hub_config_from_env_without_overrides() {
    let cfg = HubConfig::from_env().unwrap();
    assert!(cfg.validate().is_ok());
    assert!(cfg.max_blocking_threads > 0);
}
