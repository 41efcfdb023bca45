//! Filesystem-backed object storage.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::errors::ObjectStorageError;

use super::gateway::ObjectStorage;

/// Stores objects as files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    /// Creates a storage rooted at `root`. The directory is created on first upload.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, ObjectStorageError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if valid {
            Ok(self.root.join(relative))
        } else {
            Err(ObjectStorageError::InvalidKey(key.to_string()))
        }
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String, ObjectStorageError> {
        let path = self.resolve(key)?;
        let failed = |e: std::io::Error| ObjectStorageError::UploadFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(failed)?;
        }
        tokio::fs::write(&path, bytes).await.map_err(failed)?;

        debug!(key, size = bytes.len(), "Object written");
        Ok(format!("file://{}", path.display()))
    }
}
