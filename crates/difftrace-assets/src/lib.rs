//! Attention asset pipeline for diffusion trace datasets.
//!
//! Datasets are loaded from a base URL or a local directory, attention tensors
//! are decoded off the caller's thread by a [`channel::ComputeChannel`], and both
//! fetched buffers and decoded maps are held in bounded LRU caches owned by the
//! [`Dataset`].

pub mod caching;
pub mod channel;
pub mod config;
pub mod dataset;
pub mod decoder;
pub mod error;
pub mod facade;
pub mod logging;
pub mod sanitize;

pub use caching::{BoundedCache, CacheMetrics, DECODED_MAP_CACHE_CAPACITY, RAW_BUFFER_CACHE_CAPACITY};
pub use channel::{ComputeChannel, ComputeHandler, ComputeOutput, ComputeRequest, ContextState, DecoderHandler, PendingCall};
pub use config::AssetConfig;
pub use dataset::{
    AssetIssue, AssetIssueKind, AttentionFileEntry, AttentionKind, AttentionLookup, Dataset, DatasetLoader, DatasetMode, DatasetSource, LocalFileSet, PreviewHandle, RemoteSource
};
pub use decoder::AttentionMap;
pub use error::{AssetError, AssetResult, ChannelError, ConfigError, DecodeError, LoadError, ParseError, TransportError};
pub use facade::{DatasetCacheMetrics, LoadedMap, MapKey};
