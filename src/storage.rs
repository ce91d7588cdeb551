use std::path::{Path, PathBuf};

use log::debug;
use uuid::Uuid;

use crate::error::StorageError;

/// Filename used when the client sends none, or one with no usable characters.
const FALLBACK_FILENAME: &str = "upload.jpg";

/// Local artifact store for uploaded images.
///
/// Every upload is written under `root` before inference so the detector and
/// the report e-mail can both read it from disk. Files are kept indefinitely.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// the first [`ArtifactStore::store`] call.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory uploads are written to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `bytes` and return the path they were written to.
    ///
    /// The stored name is `<uuid>_<sanitized original name>`, so two requests
    /// uploading the same filename never overwrite each other.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload directory cannot be created or the file
    /// cannot be written. Nothing is retried.
    pub async fn store(
        &self,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::CreateDirFailed {
                path: self.root.display().to_string(),
                reason: e.to_string(),
            })?;

        let path = self.root.join(storage_key(original_filename));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::WriteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }
}

/// Build a collision-resistant file name from a client-supplied one.
fn storage_key(original_filename: &str) -> String {
    format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(original_filename))
}

/// Keep only the final path component and replace anything outside
/// `[A-Za-z0-9._-]` with `_`.
fn sanitize_filename(original_filename: &str) -> String {
    let base = original_filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches(['.', '_']).is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned
    }
}
