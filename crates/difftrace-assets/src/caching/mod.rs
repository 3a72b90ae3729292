//! Bounded least-recently-used caches for raw buffers and decoded maps.

pub mod bounded;
pub mod metrics;

pub use bounded::BoundedCache;
pub use metrics::{CacheEvent, CacheEventKind, CacheMetrics};

/// Entry bound of the raw buffer cache.
pub const RAW_BUFFER_CACHE_CAPACITY: usize = 80;
/// Entry bound of the decoded map cache.
pub const DECODED_MAP_CACHE_CAPACITY: usize = 160;
