//! File storage providers for temporary upload staging.
//!
//! Uploaded bytes are staged by a [`StorageProvider`] before parsing and
//! deleted again after embedding, whatever the pipeline outcome. The only
//! shipped implementation is [`LocalStorage`]; remote stores plug in behind
//! the same trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// A staged upload: where the bytes live and who owns them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileHandle {
    /// Unique id for the staged file.
    pub id: String,
    /// Owner identity. Deletion is refused for any other caller.
    pub owner: String,
    /// Original file name.
    pub name: String,
    /// Path or provider-specific handle to the staged bytes.
    pub path: PathBuf,
    /// MIME content type.
    pub content_type: String,
    /// When the file was staged.
    pub uploaded_at: DateTime<Utc>,
}

/// A backend that stages uploaded bytes and deletes them after use.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Stage uploaded bytes, returning a handle for later reads and deletion.
    async fn upload(
        &self,
        bytes: &[u8],
        name: &str,
        content_type: &str,
        owner: &str,
    ) -> Result<FileHandle>;

    /// Read a staged file's bytes.
    async fn read(&self, handle: &FileHandle) -> Result<Vec<u8>>;

    /// Delete a staged file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StorageError`] with an `Unauthorized`
    /// message if `owner` does not match the handle's owner.
    async fn delete(&self, handle: &FileHandle, owner: &str) -> Result<()>;
}

/// Stages files on the local filesystem under a root directory.
///
/// Each upload lands in its own id-named subdirectory so identically named
/// files from concurrent batches never collide.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create a provider rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a provider rooted at the system temporary directory.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join("papyrus-staging"))
    }

    fn io_err(op: &str, path: &Path, e: std::io::Error) -> PipelineError {
        PipelineError::StorageError {
            provider: "local".to_string(),
            message: format!("{op} {} failed: {e}", path.display()),
        }
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn upload(
        &self,
        bytes: &[u8],
        name: &str,
        content_type: &str,
        owner: &str,
    ) -> Result<FileHandle> {
        let id = uuid::Uuid::new_v4().to_string();
        let dir = self.root.join(&id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| Self::io_err("creating", &dir, e))?;

        let path = dir.join(name);
        tokio::fs::write(&path, bytes).await.map_err(|e| Self::io_err("writing", &path, e))?;

        Ok(FileHandle {
            id,
            owner: owner.to_string(),
            name: name.to_string(),
            path,
            content_type: content_type.to_string(),
            uploaded_at: Utc::now(),
        })
    }

    async fn read(&self, handle: &FileHandle) -> Result<Vec<u8>> {
        tokio::fs::read(&handle.path).await.map_err(|e| Self::io_err("reading", &handle.path, e))
    }

    async fn delete(&self, handle: &FileHandle, owner: &str) -> Result<()> {
        if handle.owner != owner {
            return Err(PipelineError::StorageError {
                provider: "local".to_string(),
                message: format!("Unauthorized: '{owner}' does not own '{}'", handle.name),
            });
        }
        let dir = self.root.join(&handle.id);
        tokio::fs::remove_dir_all(&dir).await.map_err(|e| Self::io_err("deleting", &dir, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_read_delete_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let handle =
            storage.upload(b"hello", "notes.txt", "text/plain", "a@b.c").await.unwrap();
        assert_eq!(storage.read(&handle).await.unwrap(), b"hello");

        storage.delete(&handle, "a@b.c").await.unwrap();
        assert!(storage.read(&handle).await.is_err());
    }

    #[tokio::test]
    async fn delete_refuses_other_owners() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let handle =
            storage.upload(b"hello", "notes.txt", "text/plain", "a@b.c").await.unwrap();
        let err = storage.delete(&handle, "intruder@b.c").await.unwrap_err();
        assert!(err.to_string().contains("Unauthorized"));

        // The file is still there for its real owner.
        assert_eq!(storage.read(&handle).await.unwrap(), b"hello");
    }
}
