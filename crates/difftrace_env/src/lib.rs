//! `DIFFTRACE_*` process environment settings.
//!
//! Each [`Setting`] names one variable and the type it parses into. Reads are
//! lock-free; writes go through [`ScopedEnv`], which serialises on a process-wide
//! mutex and puts the previous value back when it drops.
//!
//! ```
//! use std::num::NonZeroU64;
//!
//! use difftrace_env::REQUEST_TIMEOUT_MS;
//!
//! let timeout = NonZeroU64::new(5_000).unwrap();
//! let _scope = REQUEST_TIMEOUT_MS.scoped(timeout);
//! assert_eq!(REQUEST_TIMEOUT_MS.get().unwrap(), Some(timeout));
//! ```

mod scoped;
mod settings;

pub use scoped::ScopedEnv;
pub use settings::{AssetVar, DECODED_CACHE_CAPACITY, EnvError, LOG_LEVEL, RAW_CACHE_CAPACITY, REQUEST_TIMEOUT_MS, Setting};
