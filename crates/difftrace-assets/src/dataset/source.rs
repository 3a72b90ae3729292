//! Byte sources a dataset can be read from.

use std::{
    fs, io::Read, path::Path, sync::Arc, time::Duration
};

use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use super::preview::PreviewHandle;
use crate::error::{AssetResult, TransportError};

/// Whether a dataset is served over HTTP or from a local file selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatasetMode {
    Url,
    Local,
}

impl std::fmt::Display for DatasetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DatasetMode::Url => "url",
            DatasetMode::Local => "local",
        })
    }
}

/// Path resolution capability shared by metadata loading and asset retrieval.
pub trait DatasetSource: Send + Sync {
    fn mode(&self) -> DatasetMode;

    /// Human readable origin, used in logs and diagnostics.
    fn describe(&self) -> String;

    /// Read the full contents of a dataset-relative path.
    fn resolve(&self, path: &str) -> AssetResult<Arc<[u8]>>;

    /// A displayable location for an image. The default reads the bytes and
    /// materialises them into an owned temporary file.
    fn preview(&self, path: &str) -> AssetResult<PreviewHandle> {
        let bytes = self.resolve(path)?;
        Ok(PreviewHandle::materialise(&normalize_path(path), &bytes)?)
    }

    /// Total payload size when it is known without fetching.
    fn total_bytes(&self) -> Option<u64> {
        None
    }
}

/// Strip leading `./` markers and unify separators to `/`.
pub fn normalize_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let mut rest = unified.as_str();
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            break;
        }
    }
    rest.to_string()
}

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Dataset hosted under an HTTP base URL.
pub struct RemoteSource {
    base_url: String,
    agent: ureq::Agent,
}

impl RemoteSource {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(DEFAULT_HTTP_TIMEOUT).build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, normalize_path(path))
    }
}

impl DatasetSource for RemoteSource {
    fn mode(&self) -> DatasetMode {
        DatasetMode::Url
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }

    fn resolve(&self, path: &str) -> AssetResult<Arc<[u8]>> {
        let url = self.url_for(path);
        debug!(%url, "fetching dataset asset");
        let response = self.agent.get(&url).call().map_err(|err| match err {
            ureq::Error::Status(status, _) => TransportError::HttpStatus { url: url.clone(), status },
            ureq::Error::Transport(transport) => TransportError::Http {
                url: url.clone(),
                message: transport.to_string(),
            },
        })?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|source| TransportError::Io { path: url.clone(), source })?;
        Ok(Arc::from(bytes))
    }

    fn preview(&self, path: &str) -> AssetResult<PreviewHandle> {
        Ok(PreviewHandle::Remote { url: self.url_for(path) })
    }
}

/// In-memory file selection keyed by relative path.
///
/// Folder pickers usually prefix every path with the selected directory's
/// name, so lookups fall back to suffix matching when no exact key exists.
#[derive(Default)]
pub struct LocalFileSet {
    label: String,
    files: FxHashMap<String, Arc<[u8]>>,
}

impl LocalFileSet {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            files: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, path: &str, bytes: impl Into<Arc<[u8]>>) {
        self.files.insert(normalize_path(path), bytes.into());
    }

    pub fn with_file(mut self, path: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.insert(path, bytes);
        self
    }

    /// Read every file under `dir`, keyed as `<dir name>/<relative path>`.
    pub fn from_directory(dir: &Path) -> Result<Self, TransportError> {
        let root_name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut set = LocalFileSet::new(dir.display().to_string());
        let mut stack = vec![dir.to_path_buf()];
        let io_err = |path: &Path, source: std::io::Error| TransportError::Io {
            path: path.display().to_string(),
            source,
        };

        while let Some(current) = stack.pop() {
            for entry in fs::read_dir(&current).map_err(|err| io_err(&current, err))? {
                let entry = entry.map_err(|err| io_err(&current, err))?;
                let path = entry.path();
                // Follows symlinks, so linked files and folders are indexed like real ones.
                let metadata = match fs::metadata(&path) {
                    Ok(metadata) => metadata,
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping unreadable dataset entry");
                        continue;
                    }
                };
                if metadata.is_dir() {
                    stack.push(path);
                    continue;
                }
                if !metadata.is_file() {
                    debug!(path = %path.display(), "skipping non-file dataset entry");
                    continue;
                }
                let relative = path.strip_prefix(dir).unwrap_or(&path);
                let relative = relative.to_string_lossy();
                let key = if root_name.is_empty() {
                    relative.into_owned()
                } else {
                    format!("{root_name}/{relative}")
                };
                let bytes = fs::read(&path).map_err(|err| io_err(&path, err))?;
                set.insert(&key, bytes);
            }
        }

        info!(dir = %dir.display(), files = set.len(), "indexed local dataset");
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Exact normalised match first, then the shortest candidate ending in `/<path>`.
    pub fn find(&self, path: &str) -> Option<&Arc<[u8]>> {
        let wanted = normalize_path(path);
        if let Some(bytes) = self.files.get(&wanted) {
            return Some(bytes);
        }
        if wanted.is_empty() {
            return None;
        }
        let suffix = format!("/{wanted}");
        self.files
            .iter()
            .filter(|(candidate, _)| candidate.ends_with(&suffix))
            .min_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
            .map(|(_, bytes)| bytes)
    }
}

impl DatasetSource for LocalFileSet {
    fn mode(&self) -> DatasetMode {
        DatasetMode::Local
    }

    fn describe(&self) -> String {
        self.label.clone()
    }

    fn resolve(&self, path: &str) -> AssetResult<Arc<[u8]>> {
        self.find(path).cloned().ok_or_else(|| {
            TransportError::MissingLocalFile {
                path: normalize_path(path),
            }
            .into()
        })
    }

    fn total_bytes(&self) -> Option<u64> {
        Some(self.files.values().map(|bytes| bytes.len() as u64).sum())
    }
}

#[cfg(test)]
#[path = "source.test.rs"]
mod tests;
