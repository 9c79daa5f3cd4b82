use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use super::{ObjectStore, StoredObject};
use crate::error::{AppError, Result};

/// Object store backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Keys are relative, slash-separated and may not leave the root.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty() || relative.is_absolute() {
            return Err(AppError::Storage(format!("Invalid object key: {:?}", key)));
        }
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(AppError::Storage(format!("Invalid object key: {:?}", key)));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<StoredObject> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
        }

        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        tracing::debug!("Stored {} bytes at {}", bytes.len(), path);

        Ok(StoredObject {
            path: path.to_string(),
            size: bytes.len() as u64,
        })
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Storage(e.to_string())),
        }
    }
}
