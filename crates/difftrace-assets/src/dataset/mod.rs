//! Loaded datasets and the sources they are read from.

pub mod loader;
pub mod metadata;
pub mod preview;
pub mod source;
pub mod validation;

use std::sync::{Arc, Mutex, MutexGuard};

pub use loader::DatasetLoader;
pub use metadata::{
    AttentionFileEntry, AttentionKey, AttentionKind, AttentionLookup, DatasetMetadata, LatentPca, Metrics
};
pub use preview::PreviewHandle;
use preview::PreviewRegistry;
pub use source::{DatasetMode, DatasetSource, LocalFileSet, RemoteSource, normalize_path};
pub use validation::{AssetIssue, AssetIssueKind};

use crate::{
    caching::BoundedCache, channel::ComputeChannel, config::AssetConfig, decoder::AttentionMap, facade::MapKey
};

pub(crate) type RawBufferCache = BoundedCache<String, Arc<[u8]>>;
pub(crate) type DecodedMapCache = BoundedCache<MapKey, Arc<AttentionMap>>;

/// A validated dataset together with everything it exclusively owns: both
/// caches, outstanding preview handles and its compute channel.
pub struct Dataset {
    source: Arc<dyn DatasetSource>,
    metadata: DatasetMetadata,
    metrics: Metrics,
    latent_pca: LatentPca,
    lookup: AttentionLookup,
    warnings: Vec<String>,
    raw_cache: Mutex<RawBufferCache>,
    decoded_cache: Mutex<DecodedMapCache>,
    previews: Mutex<PreviewRegistry>,
    channel: ComputeChannel,
}

impl Dataset {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        source: Arc<dyn DatasetSource>,
        metadata: DatasetMetadata,
        metrics: Metrics,
        latent_pca: LatentPca,
        lookup: AttentionLookup,
        warnings: Vec<String>,
        channel: ComputeChannel,
        config: &AssetConfig,
    ) -> Self {
        Self {
            source,
            metadata,
            metrics,
            latent_pca,
            lookup,
            warnings,
            raw_cache: Mutex::new(BoundedCache::new("raw_buffers", config.raw_cache_capacity)),
            decoded_cache: Mutex::new(BoundedCache::new("decoded_maps", config.decoded_cache_capacity)),
            previews: Mutex::new(PreviewRegistry::default()),
            channel,
        }
    }

    pub fn mode(&self) -> DatasetMode {
        self.source.mode()
    }

    pub fn source(&self) -> &dyn DatasetSource {
        self.source.as_ref()
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn latent_pca(&self) -> &LatentPca {
        &self.latent_pca
    }

    pub fn attention_lookup(&self) -> &AttentionLookup {
        &self.lookup
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn channel(&self) -> &ComputeChannel {
        &self.channel
    }

    /// Check every indexed attention file against its declared shape.
    pub fn validate_attention_assets(&self) -> Vec<AssetIssue> {
        validation::check_attention_assets(self.source.as_ref(), &self.metadata.attention_files)
    }

    pub(crate) fn raw_cache(&self) -> MutexGuard<'_, RawBufferCache> {
        self.raw_cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn decoded_cache(&self) -> MutexGuard<'_, DecodedMapCache> {
        self.decoded_cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn previews(&self) -> MutexGuard<'_, PreviewRegistry> {
        self.previews.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("source", &self.source.describe())
            .field("mode", &self.mode())
            .field("steps", &self.metadata.steps)
            .field("attention_files", &self.lookup.len())
            .field("warnings", &self.warnings.len())
            .finish_non_exhaustive()
    }
}
