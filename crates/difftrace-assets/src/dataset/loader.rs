use std::{path::Path, sync::Arc};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use super::{
    Dataset, metadata::{AttentionLookup, DatasetMetadata, LatentPca, Metrics}, source::{DatasetSource, LocalFileSet, RemoteSource}, validation
};
use crate::{
    channel::{ComputeChannel, ComputeHandler}, config::AssetConfig, error::{AssetResult, LoadError}, sanitize::parse_with_sanitization
};

pub const METADATA_FILE: &str = "metadata.json";

/// Builds fully validated [`Dataset`]s from a [`DatasetSource`].
#[derive(Clone)]
pub struct DatasetLoader {
    config: AssetConfig,
    handler: Option<Arc<dyn ComputeHandler>>,
}

impl Default for DatasetLoader {
    fn default() -> Self {
        Self::new(AssetConfig::default())
    }
}

impl DatasetLoader {
    pub fn new(config: AssetConfig) -> Self {
        Self { config, handler: None }
    }

    /// Replace the decoder hosted by each dataset's compute channel.
    pub fn with_handler(mut self, handler: Arc<dyn ComputeHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    /// `http://` and `https://` locations are fetched remotely; anything else is a local directory.
    pub fn open(&self, location: &str) -> AssetResult<Dataset> {
        let source: Arc<dyn DatasetSource> = if location.starts_with("http://") || location.starts_with("https://") {
            Arc::new(RemoteSource::new(location))
        } else {
            Arc::new(LocalFileSet::from_directory(Path::new(location))?)
        };
        self.load(source)
    }

    pub fn load(&self, source: Arc<dyn DatasetSource>) -> AssetResult<Dataset> {
        self.config.validate()?;

        let document: Value = read_json(source.as_ref(), METADATA_FILE)?;
        validation::check_metadata_document(&document)?;
        let metadata: DatasetMetadata = serde_json::from_value(document).map_err(|err| LoadError::Schema {
            label: METADATA_FILE.to_string(),
            message: err.to_string(),
        })?;

        let metrics: Metrics = read_json(source.as_ref(), metadata.artifacts.metrics_path())?;
        let latent_pca: LatentPca = read_json(source.as_ref(), metadata.artifacts.latent_pca_path())?;
        let lookup = AttentionLookup::build(&metadata.attention_files)?;

        let warnings = validation::collect_warnings(&metadata, &metrics, &latent_pca, source.total_bytes());
        for warning in &warnings {
            warn!(dataset = %source.describe(), "{warning}");
        }

        let channel = match &self.handler {
            Some(handler) => ComputeChannel::with_handler(self.config.request_timeout, Arc::clone(handler)),
            None => ComputeChannel::new(self.config.request_timeout),
        };

        info!(
            dataset = %source.describe(),
            mode = %source.mode(),
            steps = metadata.steps,
            attention_files = lookup.len(),
            warnings = warnings.len(),
            "dataset loaded"
        );

        Ok(Dataset::assemble(
            source,
            metadata,
            metrics,
            latent_pca,
            lookup,
            warnings,
            channel,
            &self.config,
        ))
    }
}

fn read_json<T: DeserializeOwned>(source: &dyn DatasetSource, path: &str) -> AssetResult<T> {
    let bytes = source.resolve(path)?;
    let text = std::str::from_utf8(&bytes).map_err(|err| LoadError::Schema {
        label: path.to_string(),
        message: format!("not valid UTF-8: {err}"),
    })?;
    Ok(parse_with_sanitization(text, path)?)
}
