//! Runtime tuning for the asset pipeline.

use std::time::Duration;

use difftrace_env::{DECODED_CACHE_CAPACITY, LOG_LEVEL, RAW_CACHE_CAPACITY, REQUEST_TIMEOUT_MS};
use tracing::Level;

use crate::{
    caching::{DECODED_MAP_CACHE_CAPACITY, RAW_BUFFER_CACHE_CAPACITY}, channel::DEFAULT_REQUEST_TIMEOUT, error::ConfigError
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetConfig {
    pub request_timeout: Duration,
    pub raw_cache_capacity: usize,
    pub decoded_cache_capacity: usize,
    pub log_level: Level,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            raw_cache_capacity: RAW_BUFFER_CACHE_CAPACITY,
            decoded_cache_capacity: DECODED_MAP_CACHE_CAPACITY,
            log_level: Level::INFO,
        }
    }
}

impl AssetConfig {
    /// Defaults overlaid with any `DIFFTRACE_*` variables present in the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = REQUEST_TIMEOUT_MS.get()? {
            config.request_timeout = Duration::from_millis(ms.get());
        }
        if let Some(capacity) = RAW_CACHE_CAPACITY.get()? {
            config.raw_cache_capacity = capacity.get();
        }
        if let Some(capacity) = DECODED_CACHE_CAPACITY.get()? {
            config.decoded_cache_capacity = capacity.get();
        }
        if let Some(level) = LOG_LEVEL.get()? {
            config.log_level = level;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "request_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.raw_cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "raw_cache_capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.decoded_cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "decoded_cache_capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config.test.rs"]
mod tests;
