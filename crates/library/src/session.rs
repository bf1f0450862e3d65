//! Per-run state: the archive backend, its index and the names claimed so far.

use crate::error::{ErrorKind, Result};
use crate::plan::Claims;
use exn::ResultExt;
use lens_index::IndexStore;
use lens_storage::BackendHandle;
use lens_storage::backend::ReadOnlyBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

const WRITE_CHECK_FILE: &str = ".lens-sorter-write-check";

/// An open archive.
///
/// Everything that must survive between files of one run lives here, and
/// nothing outlives it: the next run starts from what the index says.
pub struct Session {
    backend: BackendHandle,
    index: IndexStore,
    claims: Claims,
    dry_run: bool,
}
impl Session {
    /// Open the archive behind `backend` and load its index.
    ///
    /// Unless `dry_run`, the archive root must be writable. In a dry run the
    /// backend is wrapped in a [`ReadOnlyBackend`] so that nothing (files,
    /// partitions, index) is changed.
    #[instrument(skip_all, fields(backend = backend.name(), dry_run = dry_run))]
    pub async fn open(backend: BackendHandle, index_file: impl Into<PathBuf>, dry_run: bool) -> Result<Self> {
        let backend: BackendHandle = match dry_run {
            true => Arc::new(ReadOnlyBackend::new(backend)),
            false => {
                Self::check_writable(&backend).await?;
                backend
            },
        };
        let index = IndexStore::load(backend.clone(), index_file).await.or_raise(|| ErrorKind::Index)?;
        Ok(Self { backend, index, claims: Claims::default(), dry_run })
    }

    async fn check_writable(backend: &BackendHandle) -> Result<()> {
        let marker = Path::new(WRITE_CHECK_FILE);
        let writable = async {
            backend.write(marker, b"").await?;
            backend.delete(marker).await
        };
        writable.await.or_raise(|| ErrorKind::ArchiveNotWritable(backend.name().to_string()))
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    pub fn index(&self) -> &IndexStore {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut IndexStore {
        &mut self.index
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn claims_mut(&mut self) -> &mut Claims {
        &mut self.claims
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Persist the index if anything changed.
    pub async fn flush(&mut self) -> Result<bool> {
        self.index.flush().await.or_raise(|| ErrorKind::Index)
    }

    /// Flush and end the session.
    pub async fn close(mut self) -> Result<()> {
        self.flush().await?;
        tracing::debug!(records = self.index.document().files.len(), "Session closed");
        Ok(())
    }
}
