use std::{
    env::{self, VarError}, fmt::Display, marker::PhantomData, num::{NonZeroU64, NonZeroUsize}, str::FromStr
};

use thiserror::Error;
use tracing::Level;

use crate::scoped::ScopedEnv;

/// Variables understood by the asset pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetVar {
    /// Default tracing level for library and CLI logs.
    LogLevel,
    /// Compute channel request timeout, in milliseconds.
    RequestTimeoutMs,
    RawCacheCapacity,
    DecodedCacheCapacity,
}

impl AssetVar {
    pub const ALL: [AssetVar; 4] = [
        AssetVar::LogLevel,
        AssetVar::RequestTimeoutMs,
        AssetVar::RawCacheCapacity,
        AssetVar::DecodedCacheCapacity,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            AssetVar::LogLevel => "DIFFTRACE_LOG_LEVEL",
            AssetVar::RequestTimeoutMs => "DIFFTRACE_REQUEST_TIMEOUT_MS",
            AssetVar::RawCacheCapacity => "DIFFTRACE_RAW_CACHE_CAPACITY",
            AssetVar::DecodedCacheCapacity => "DIFFTRACE_DECODED_CACHE_CAPACITY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("invalid {key}='{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{key} is not valid unicode")]
    NotUnicode { key: &'static str },
}

/// A variable paired with the type its value parses into.
///
/// Values are trimmed before parsing. Zero is unrepresentable for the
/// `NonZero*` settings, so `0` is reported as invalid.
pub struct Setting<T> {
    var: AssetVar,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for Setting<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Setting<T> {}

impl<T> Setting<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    pub const fn new(var: AssetVar) -> Self {
        Self {
            var,
            _value: PhantomData,
        }
    }

    pub const fn var(&self) -> AssetVar {
        self.var
    }

    pub const fn key(&self) -> &'static str {
        self.var.key()
    }

    /// `Ok(None)` when unset.
    pub fn get(&self) -> Result<Option<T>, EnvError> {
        let key = self.key();
        let raw = match env::var(key) {
            Ok(raw) => raw,
            Err(VarError::NotPresent) => return Ok(None),
            Err(VarError::NotUnicode(_)) => return Err(EnvError::NotUnicode { key }),
        };
        raw.trim().parse::<T>().map(Some).map_err(|err| EnvError::Invalid {
            key,
            reason: err.to_string(),
            value: raw,
        })
    }

    /// Set the variable to `value` until the returned scope drops.
    #[must_use]
    pub fn scoped(&self, value: T) -> ScopedEnv {
        ScopedEnv::set(self.var, &value.to_string())
    }

    /// Remove the variable until the returned scope drops.
    #[must_use]
    pub fn cleared(&self) -> ScopedEnv {
        ScopedEnv::remove(self.var)
    }
}

pub const LOG_LEVEL: Setting<Level> = Setting::new(AssetVar::LogLevel);
pub const REQUEST_TIMEOUT_MS: Setting<NonZeroU64> = Setting::new(AssetVar::RequestTimeoutMs);
pub const RAW_CACHE_CAPACITY: Setting<NonZeroUsize> = Setting::new(AssetVar::RawCacheCapacity);
pub const DECODED_CACHE_CAPACITY: Setting<NonZeroUsize> = Setting::new(AssetVar::DecodedCacheCapacity);
