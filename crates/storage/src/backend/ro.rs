//! Readonly filesystem storage backend.
//!
//! This module provides a storage backend implementation that wraps other
//! implementations and prevents write operations from executing, but
//! indicating success on return. It is what makes a dry run dry.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::{BackendHandle, StorageBackend, backend::FileInfoStream, error::Result};

/// Read-only storage backend.
///
/// Wraps another backend and silently drops all mutating operations, logging
/// an [`info event`](tracing::Event) describing what would have happened.
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        self.inner.list_stream(prefix)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        tracing::info!(path = %path.display(), bytes = data.len(), "Skipping write during read-only mode");
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "Skipping delete during read-only mode");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        tracing::info!(from = %from.display(), to = %to.display(), "Skipping rename during read-only mode");
        Ok(())
    }

    async fn import(&self, source: &Path, to: &Path) -> Result<()> {
        tracing::info!(from = %source.display(), to = %to.display(), "Skipping import during read-only mode");
        Ok(())
    }

    async fn export(&self, from: &Path, target: &Path) -> Result<()> {
        tracing::info!(from = %from.display(), to = %target.display(), "Skipping export during read-only mode");
        Ok(())
    }

    fn local_path(&self, path: &Path) -> Result<PathBuf> {
        self.inner.local_path(path)
    }
}
