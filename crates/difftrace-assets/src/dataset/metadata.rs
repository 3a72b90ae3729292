//! Dataset documents as written by the trace generator.

use std::{collections::BTreeMap, fmt};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttentionKind {
    Cross,
    #[serde(rename = "self")]
    SelfAttention,
}

impl AttentionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            AttentionKind::Cross => "cross",
            AttentionKind::SelfAttention => "self",
        }
    }

    /// Rank of the stored tensor: `[tokens, h, w]` or `[h, w]`.
    pub const fn rank(self) -> usize {
        match self {
            AttentionKind::Cross => 3,
            AttentionKind::SelfAttention => 2,
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "cross" => Some(AttentionKind::Cross),
            "self" => Some(AttentionKind::SelfAttention),
            _ => None,
        }
    }
}

impl fmt::Display for AttentionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_dtype() -> String {
    "float16".to_string()
}

/// One packed attention tensor on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttentionFileEntry {
    pub attention_type: AttentionKind,
    pub layer_id: String,
    pub step: u32,
    pub path: String,
    pub shape: Vec<usize>,
    #[serde(default = "default_dtype")]
    pub dtype: String,
}

impl AttentionFileEntry {
    pub fn key(&self) -> AttentionKey {
        AttentionKey::new(self.attention_type, &self.layer_id, self.step)
    }

    /// Number of half-precision words the file must contain.
    pub fn element_count(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }
}

/// Composite `(type, layer, step)` address of an attention file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AttentionKey {
    pub kind: AttentionKind,
    pub layer_id: String,
    pub step: u32,
}

impl AttentionKey {
    pub fn new(kind: AttentionKind, layer_id: &str, step: u32) -> Self {
        Self {
            kind,
            layer_id: layer_id.to_string(),
            step,
        }
    }
}

impl fmt::Display for AttentionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.layer_id, self.step)
    }
}

/// Read-only index from composite key to attention file, built once per load.
#[derive(Clone, Debug, Default)]
pub struct AttentionLookup {
    entries: FxHashMap<AttentionKey, AttentionFileEntry>,
}

impl AttentionLookup {
    /// Index `entries`, rejecting duplicate composite keys.
    pub fn build(entries: &[AttentionFileEntry]) -> Result<Self, LoadError> {
        let mut index = FxHashMap::default();
        for (position, entry) in entries.iter().enumerate() {
            let key = entry.key();
            if index.contains_key(&key) {
                return Err(LoadError::InvalidAttentionEntry {
                    index: position,
                    reason: format!("duplicates key {key}"),
                });
            }
            index.insert(key, entry.clone());
        }
        Ok(Self { entries: index })
    }

    pub fn get(&self, kind: AttentionKind, layer_id: &str, step: u32) -> Option<&AttentionFileEntry> {
        self.entries.get(&AttentionKey::new(kind, layer_id, step))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttentionFileEntry> {
        self.entries.values()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptInfo {
    pub text: Option<String>,
    pub negative: Option<String>,
    pub tokens: Vec<String>,
    pub token_ids: Vec<i64>,
    pub meaningful_token_count: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub id: String,
    pub attention_type: AttentionKind,
    #[serde(default)]
    pub processor_key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Artifacts {
    pub metrics: Option<String>,
    pub latent_pca: Option<String>,
}

impl Artifacts {
    pub fn metrics_path(&self) -> &str {
        self.metrics.as_deref().unwrap_or("metrics.json")
    }

    pub fn latent_pca_path(&self) -> &str {
        self.latent_pca.as_deref().unwrap_or("latent_pca.json")
    }
}

/// `metadata.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub schema_version: String,
    pub prompt: PromptInfo,
    pub steps: u32,
    #[serde(default)]
    pub timesteps: Option<Vec<Option<f64>>>,
    pub images: Vec<String>,
    pub layers: Vec<LayerInfo>,
    pub attention_files: Vec<AttentionFileEntry>,
    #[serde(default)]
    pub generator: serde_json::Value,
    #[serde(default)]
    pub artifacts: Artifacts,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyStep {
    pub step: Option<u32>,
    pub mean: Option<f64>,
    pub by_layer: BTreeMap<String, Option<f64>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenScore {
    pub token_index: usize,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenDominance {
    pub scores: Vec<Option<f64>>,
    pub ranking: Vec<TokenScore>,
}

/// `metrics.json`. Series entries are `None` where the exporter wrote a
/// non-finite value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    pub latent_l2_norm: Vec<Option<f64>>,
    pub predicted_noise_l2_norm: Vec<Option<f64>>,
    pub cosine_similarity_to_previous: Vec<Option<f64>>,
    pub attention_kl_divergence: Vec<Option<f64>>,
    pub cross_attention_entropy: Vec<EntropyStep>,
    pub self_attention_entropy: Vec<EntropyStep>,
    pub mean_token_activation: Vec<Vec<Option<f64>>>,
    pub token_dominance: TokenDominance,
}

/// `latent_pca.json`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatentPca {
    pub points: Vec<Vec<Option<f64>>>,
    pub explained_variance_ratio: Vec<Option<f64>>,
}
