use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, StoreError};

/// Narrow seam over the external object storage that holds raw
/// material bytes. The core only ever needs fetch-by-ref; `put` exists
/// for the upload producer.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch(&self, file_ref: &str) -> Result<Vec<u8>>;
    async fn put(&self, file_ref: &str, bytes: &[u8]) -> Result<()>;
}

/// Filesystem-backed object store for single-host deployments and tests.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a file_ref under the root, rejecting traversal segments.
    fn resolve(&self, file_ref: &str) -> Result<PathBuf> {
        let rel = Path::new(file_ref);
        let traversal = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if file_ref.is_empty() || traversal {
            return Err(StoreError::ObjectMissing {
                file_ref: file_ref.to_string(),
            });
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn fetch(&self, file_ref: &str) -> Result<Vec<u8>> {
        let path = self.resolve(file_ref)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::ObjectMissing {
                file_ref: file_ref.to_string(),
            }),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn put(&self, file_ref: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(file_ref)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(file_ref = %file_ref, size = bytes.len(), "object stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn put_then_fetch_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.put("c1/notes.pdf", b"pdf bytes").await.unwrap();
        let bytes = store.fetch("c1/notes.pdf").await.unwrap();
        assert_eq!(bytes, b"pdf bytes");
    }

    #[tokio::test]
    async fn missing_object_is_distinct_from_io_error() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        match store.fetch("c1/ghost.png").await {
            Err(StoreError::ObjectMissing { file_ref }) => assert_eq!(file_ref, "c1/ghost.png"),
            other => panic!("expected ObjectMissing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn traversal_refs_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(store.fetch("../etc/passwd").await.is_err());
        assert!(store.put("/abs/path", b"x").await.is_err());
        assert!(store.fetch("").await.is_err());
    }
}
