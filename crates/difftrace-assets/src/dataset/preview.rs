//! Owned preview locations for dataset images.

use std::{
    io::Write, path::{Path, PathBuf}
};

use rustc_hash::FxHashMap;
use tempfile::TempPath;
use tracing::debug;

use crate::error::TransportError;

/// Where a consumer can display an image from.
///
/// Remote handles are plain URLs. Local handles own a temporary file holding
/// the image bytes; the file is deleted when the handle drops.
#[derive(Debug)]
pub enum PreviewHandle {
    Remote { url: String },
    Local { source: String, file: TempPath },
}

impl PreviewHandle {
    /// Materialise `bytes` into a temporary file that lives as long as the handle.
    pub fn materialise(source: &str, bytes: &[u8]) -> Result<Self, TransportError> {
        let suffix = Path::new(source)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let io_err = |err: std::io::Error| TransportError::Io {
            path: source.to_string(),
            source: err,
        };
        let mut file = tempfile::Builder::new()
            .prefix("difftrace-preview-")
            .suffix(&suffix)
            .tempfile()
            .map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        Ok(PreviewHandle::Local {
            source: source.to_string(),
            file: file.into_temp_path(),
        })
    }

    /// URL or filesystem path a viewer can open.
    pub fn location(&self) -> String {
        match self {
            PreviewHandle::Remote { url } => url.clone(),
            PreviewHandle::Local { file, .. } => file.display().to_string(),
        }
    }

    pub fn local_path(&self) -> Option<PathBuf> {
        match self {
            PreviewHandle::Remote { .. } => None,
            PreviewHandle::Local { file, .. } => Some(file.to_path_buf()),
        }
    }

    pub fn needs_release(&self) -> bool {
        matches!(self, PreviewHandle::Local { .. })
    }
}

/// Preview handles keyed by consumer slot. Replacing a slot releases the old handle.
#[derive(Debug, Default)]
pub(crate) struct PreviewRegistry {
    slots: FxHashMap<String, PreviewHandle>,
}

impl PreviewRegistry {
    pub fn replace(&mut self, slot: &str, handle: PreviewHandle) -> String {
        let location = handle.location();
        if let Some(previous) = self.slots.insert(slot.to_string(), handle) {
            if previous.needs_release() {
                debug!(slot, released = %previous.location(), "superseded preview released");
            }
        }
        location
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Drop every handle; returns how many owned local files.
    pub fn release_all(&mut self) -> usize {
        let released = self.slots.values().filter(|handle| handle.needs_release()).count();
        self.slots.clear();
        released
    }
}
