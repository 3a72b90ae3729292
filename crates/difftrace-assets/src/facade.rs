//! Uniform attention access over a loaded [`Dataset`].
//!
//! Absent layer/step pairs are a normal state and yield `None` before any
//! cache or channel work happens. Present entries go through the raw buffer
//! cache, the compute channel and the decoded map cache, in that order. Locks
//! are never held across I/O or a channel round-trip, so concurrent requests
//! for the same key both do the work and the last writer wins.

use std::{fmt, sync::Arc};

use tracing::{debug, info};

use crate::{
    caching::CacheMetrics, dataset::{AttentionFileEntry, AttentionKind, Dataset, normalize_path}, decoder::AttentionMap, error::AssetResult
};

/// Decoded map cache key: `cross:<layer>:<step>:<token>` or `self:<layer>:<step>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MapKey {
    pub kind: AttentionKind,
    pub layer_id: String,
    pub step: u32,
    pub token_index: Option<usize>,
}

impl MapKey {
    pub fn cross(layer_id: &str, step: u32, token_index: usize) -> Self {
        Self {
            kind: AttentionKind::Cross,
            layer_id: layer_id.to_string(),
            step,
            token_index: Some(token_index),
        }
    }

    pub fn self_attention(layer_id: &str, step: u32) -> Self {
        Self {
            kind: AttentionKind::SelfAttention,
            layer_id: layer_id.to_string(),
            step,
            token_index: None,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.layer_id, self.step)?;
        if let Some(token) = self.token_index {
            write!(f, ":{token}")?;
        }
        Ok(())
    }
}

/// A decoded map together with the coordinates it was requested at.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedMap {
    pub map: Arc<AttentionMap>,
    pub layer_id: String,
    pub step: u32,
    pub token_index: Option<usize>,
}

impl LoadedMap {
    pub fn shape(&self) -> [usize; 2] {
        self.map.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.map.map
    }
}

#[derive(Clone, Debug)]
pub struct DatasetCacheMetrics {
    pub raw_buffers: CacheMetrics,
    pub decoded_maps: CacheMetrics,
}

impl Dataset {
    pub fn lookup_attention_entry(&self, kind: AttentionKind, layer_id: &str, step: u32) -> Option<&AttentionFileEntry> {
        self.attention_lookup().get(kind, layer_id, step)
    }

    /// Fetch or read `path`, consulting the raw buffer cache first.
    pub fn get_raw_buffer(&self, path: &str) -> AssetResult<Arc<[u8]>> {
        let key = normalize_path(path);
        if let Some(bytes) = self.raw_cache().get(&key) {
            return Ok(bytes);
        }

        let bytes = self.source().resolve(&key)?;
        debug!(path = %key, bytes = bytes.len(), "raw buffer loaded");
        self.raw_cache().put(key, Arc::clone(&bytes));
        Ok(bytes)
    }

    pub fn load_cross_token_map(&self, layer_id: &str, step: u32, token_index: usize) -> AssetResult<Option<LoadedMap>> {
        let Some(entry) = self.lookup_attention_entry(AttentionKind::Cross, layer_id, step) else {
            return Ok(None);
        };
        let key = MapKey::cross(layer_id, step, token_index);
        let map = self.decoded_or_else(key, || {
            let buffer = self.get_raw_buffer(&entry.path)?;
            self.channel().decode_cross(buffer, entry.shape.clone(), token_index)
        })?;
        Ok(Some(LoadedMap {
            map,
            layer_id: layer_id.to_string(),
            step,
            token_index: Some(token_index),
        }))
    }

    pub fn load_self_map(&self, layer_id: &str, step: u32) -> AssetResult<Option<LoadedMap>> {
        let Some(entry) = self.lookup_attention_entry(AttentionKind::SelfAttention, layer_id, step) else {
            return Ok(None);
        };
        let key = MapKey::self_attention(layer_id, step);
        let map = self.decoded_or_else(key, || {
            let buffer = self.get_raw_buffer(&entry.path)?;
            self.channel().decode_self(buffer, entry.shape.clone())
        })?;
        Ok(Some(LoadedMap {
            map,
            layer_id: layer_id.to_string(),
            step,
            token_index: None,
        }))
    }

    /// Jensen-Shannon divergence between two maps, or `None` when either is absent.
    pub fn compute_divergence(&self, left: Option<&AttentionMap>, right: Option<&AttentionMap>) -> AssetResult<Option<f64>> {
        let (Some(left), Some(right)) = (left, right) else {
            return Ok(None);
        };
        self.channel()
            .js_divergence(Arc::from(left.map.as_slice()), Arc::from(right.map.as_slice()))
            .map(Some)
    }

    /// Shannon entropy of a map, or `None` when it is absent.
    pub fn compute_map_entropy(&self, map: Option<&AttentionMap>) -> AssetResult<Option<f64>> {
        let Some(map) = map else {
            return Ok(None);
        };
        self.channel().entropy(Arc::from(map.map.as_slice())).map(Some)
    }

    /// Displayable location of the image for `step`, held under `slot` until
    /// superseded or the dataset's resources are released.
    pub fn image_preview(&self, slot: &str, step: usize) -> AssetResult<Option<String>> {
        let Some(path) = self.metadata().images.get(step) else {
            return Ok(None);
        };
        let handle = self.source().preview(path)?;
        Ok(Some(self.previews().replace(slot, handle)))
    }

    pub fn live_previews(&self) -> usize {
        self.previews().len()
    }

    pub fn cache_metrics(&self) -> DatasetCacheMetrics {
        DatasetCacheMetrics {
            raw_buffers: self.raw_cache().metrics(),
            decoded_maps: self.decoded_cache().metrics(),
        }
    }

    /// Clear both caches, release preview handles and dispose the compute channel.
    ///
    /// The dataset stays usable; later requests refill the caches and provision a
    /// fresh compute context.
    pub fn release_dataset_resources(&self) {
        let raw = self.raw_cache().clear();
        let decoded = self.decoded_cache().clear();
        let previews = self.previews().release_all();
        self.channel().dispose();
        info!(
            dataset = %self.source().describe(),
            raw_buffers = raw,
            decoded_maps = decoded,
            previews,
            "dataset resources released"
        );
    }

    fn decoded_or_else(&self, key: MapKey, decode: impl FnOnce() -> AssetResult<AttentionMap>) -> AssetResult<Arc<AttentionMap>> {
        if let Some(map) = self.decoded_cache().get(&key) {
            return Ok(map);
        }
        let map = Arc::new(decode()?);
        debug!(key = %key, shape = ?map.shape, "attention map decoded");
        self.decoded_cache().put(key, Arc::clone(&map));
        Ok(map)
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        self.release_dataset_resources();
    }
}
