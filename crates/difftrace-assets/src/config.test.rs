#![cfg(test)]

use std::{
    num::{NonZeroU64, NonZeroUsize}, time::Duration
};

use difftrace_env::{AssetVar, DECODED_CACHE_CAPACITY, LOG_LEVEL, RAW_CACHE_CAPACITY, REQUEST_TIMEOUT_MS, ScopedEnv};
use serial_test::serial;
use tracing::Level;

use super::*;

fn clear_all() -> Vec<ScopedEnv> {
    vec![
        REQUEST_TIMEOUT_MS.cleared(),
        RAW_CACHE_CAPACITY.cleared(),
        DECODED_CACHE_CAPACITY.cleared(),
        LOG_LEVEL.cleared(),
    ]
}

#[test]
#[serial]
fn defaults_match_pipeline_constants() {
    let _cleared = clear_all();
    let config = AssetConfig::from_env().unwrap();
    assert_eq!(config, AssetConfig::default());
    assert_eq!(config.request_timeout, Duration::from_secs(30));
    assert_eq!(config.raw_cache_capacity, 80);
    assert_eq!(config.decoded_cache_capacity, 160);
}

#[test]
#[serial]
fn environment_overrides_defaults() {
    let _cleared = clear_all();
    let _timeout = REQUEST_TIMEOUT_MS.scoped(NonZeroU64::new(1_500).unwrap());
    let _raw = RAW_CACHE_CAPACITY.scoped(NonZeroUsize::new(4).unwrap());
    let _level = LOG_LEVEL.scoped(Level::DEBUG);

    let config = AssetConfig::from_env().unwrap();
    assert_eq!(config.request_timeout, Duration::from_millis(1_500));
    assert_eq!(config.raw_cache_capacity, 4);
    assert_eq!(config.decoded_cache_capacity, 160);
    assert_eq!(config.log_level, Level::DEBUG);
}

#[test]
#[serial]
fn zero_capacity_is_rejected() {
    let _cleared = clear_all();
    let _raw = ScopedEnv::set(AssetVar::RawCacheCapacity, "0");
    let err = AssetConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::Env(_)), "unexpected error: {err:?}");
}

#[test]
fn validate_rejects_zero_timeout() {
    let config = AssetConfig::default().with_request_timeout(Duration::ZERO);
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field: "request_timeout", .. }));
}
