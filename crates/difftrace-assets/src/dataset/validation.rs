//! Structural checks applied while loading a dataset.
//!
//! Integrity of the attention index is fatal. Length drift between per-step
//! series is only a warning, since charts can render gapped series.

use std::fmt;

use serde_json::{Map, Value};

use super::{
    metadata::{AttentionFileEntry, AttentionKind, DatasetMetadata, LatentPca, Metrics}, source::DatasetSource
};
use crate::error::{AssetError, LoadError, TransportError};

pub const REQUIRED_METADATA_KEYS: [&str; 6] = ["schema_version", "prompt", "steps", "images", "layers", "attention_files"];

/// Datasets above this size still load but are flagged.
pub const LARGE_DATASET_BYTES: u64 = 200 * 1024 * 1024;

const EXPECTED_DTYPE: &str = "float16";
const BYTES_PER_WORD: usize = 2;

/// Reject metadata whose required keys, step count or attention index are malformed.
pub fn check_metadata_document(document: &Value) -> Result<(), LoadError> {
    let Some(object) = document.as_object() else {
        return Err(LoadError::Schema {
            label: "metadata.json".to_string(),
            message: "top-level value must be an object".to_string(),
        });
    };

    for key in REQUIRED_METADATA_KEYS {
        if !object.contains_key(key) {
            return Err(LoadError::MissingKey(key));
        }
    }

    match object.get("steps").and_then(Value::as_u64) {
        Some(steps) if steps > 0 && steps <= u64::from(u32::MAX) => {}
        _ => return Err(LoadError::InvalidSteps),
    }

    let Some(entries) = object.get("attention_files").and_then(Value::as_array) else {
        return Err(LoadError::Schema {
            label: "metadata.json".to_string(),
            message: "attention_files must be an array".to_string(),
        });
    };
    for (index, entry) in entries.iter().enumerate() {
        check_attention_entry(entry).map_err(|reason| LoadError::InvalidAttentionEntry { index, reason })?;
    }
    Ok(())
}

fn check_attention_entry(entry: &Value) -> Result<(), String> {
    let Some(entry) = entry.as_object() else {
        return Err("is not an object".to_string());
    };

    let kind = match entry.get("attention_type").and_then(Value::as_str) {
        Some(tag) => AttentionKind::parse(tag).ok_or_else(|| format!("has invalid attention_type '{tag}'"))?,
        None => return Err("has invalid attention_type".to_string()),
    };

    if !non_empty_str(entry, "layer_id") {
        return Err("has invalid layer_id".to_string());
    }
    match entry.get("step").and_then(Value::as_u64) {
        Some(step) if step <= u64::from(u32::MAX) => {}
        _ => return Err("has invalid step".to_string()),
    }
    if !non_empty_str(entry, "path") {
        return Err("has invalid path".to_string());
    }

    let shape = match entry.get("shape").and_then(Value::as_array) {
        Some(shape) if !shape.is_empty() => shape,
        _ => return Err("has invalid shape".to_string()),
    };
    if shape.iter().any(|dim| !matches!(dim.as_u64(), Some(d) if d > 0)) {
        return Err("has non-positive shape dimensions".to_string());
    }
    if shape.len() != kind.rank() {
        return Err(format!("{kind} attention shape must have {} dimensions, got {}", kind.rank(), shape.len()));
    }
    Ok(())
}

fn non_empty_str(entry: &Map<String, Value>, key: &str) -> bool {
    matches!(entry.get(key).and_then(Value::as_str), Some(value) if !value.is_empty())
}

/// Non-fatal length and format drift across the three documents.
pub fn collect_warnings(
    metadata: &DatasetMetadata,
    metrics: &Metrics,
    latent_pca: &LatentPca,
    total_bytes: Option<u64>,
) -> Vec<String> {
    let steps = metadata.steps as usize;
    let mut warnings = Vec::new();
    let mut check_len = |label: &str, len: usize| {
        if len != steps {
            warnings.push(format!("{label} length mismatch (expected {steps}, got {len})"));
        }
    };

    check_len("metadata.images", metadata.images.len());
    if let Some(timesteps) = &metadata.timesteps {
        check_len("metadata.timesteps", timesteps.len());
    }
    check_len("metrics.latent_l2_norm", metrics.latent_l2_norm.len());
    check_len("latent_pca.points", latent_pca.points.len());

    if latent_pca.explained_variance_ratio.len() != 2 {
        warnings.push(format!(
            "latent_pca.explained_variance_ratio must have exactly two values, got {}",
            latent_pca.explained_variance_ratio.len()
        ));
    }

    for (index, entry) in metadata.attention_files.iter().enumerate() {
        if entry.dtype != EXPECTED_DTYPE {
            warnings.push(format!("attention_files[{index}] has dtype '{}', expected {EXPECTED_DTYPE}", entry.dtype));
        }
    }

    if let Some(bytes) = total_bytes.filter(|&bytes| bytes > LARGE_DATASET_BYTES) {
        warnings.push(format!("dataset size is {:.2}MB (>200MB)", bytes as f64 / (1024.0 * 1024.0)));
    }

    warnings
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetIssueKind {
    Missing,
    SizeMismatch { expected: usize, actual: usize },
    Unreadable { message: String },
}

/// One attention file that failed the on-disk check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetIssue {
    pub path: String,
    pub kind: AssetIssueKind,
}

impl fmt::Display for AssetIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AssetIssueKind::Missing => write!(f, "missing attention file: {}", self.path),
            AssetIssueKind::SizeMismatch { expected, actual } => write!(
                f,
                "attention size mismatch for {} (expected {expected} bytes, got {actual})",
                self.path
            ),
            AssetIssueKind::Unreadable { message } => write!(f, "unreadable attention file {}: {message}", self.path),
        }
    }
}

/// Resolve every attention file and compare its byte length with the declared shape.
pub fn check_attention_assets<'a>(
    source: &dyn DatasetSource,
    entries: impl IntoIterator<Item = &'a AttentionFileEntry>,
) -> Vec<AssetIssue> {
    let mut issues = Vec::new();
    for entry in entries {
        let kind = match source.resolve(&entry.path) {
            Ok(bytes) => {
                let expected = entry.element_count().and_then(|count| count.checked_mul(BYTES_PER_WORD));
                match expected {
                    Some(expected) if expected == bytes.len() => continue,
                    Some(expected) => AssetIssueKind::SizeMismatch {
                        expected,
                        actual: bytes.len(),
                    },
                    None => AssetIssueKind::Unreadable {
                        message: "declared shape overflows".to_string(),
                    },
                }
            }
            Err(AssetError::Transport(TransportError::MissingLocalFile { .. }))
            | Err(AssetError::Transport(TransportError::HttpStatus { status: 404, .. })) => AssetIssueKind::Missing,
            Err(err) => AssetIssueKind::Unreadable { message: err.to_string() },
        };
        issues.push(AssetIssue {
            path: entry.path.clone(),
            kind,
        });
    }
    issues
}

#[cfg(test)]
#[path = "validation.test.rs"]
mod tests;
