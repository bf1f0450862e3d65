//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, the single interface the
//! organizing engine uses to touch the archive: the local filesystem in
//! production, a read-only decorator for dry runs, and an in-memory mock with
//! fault injection for tests.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod ro;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::{MockBackend, Operation};
pub use self::ro::ReadOnlyBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for archive storage.
///
/// All storage operations are asynchronous; each one is a suspension point
/// for the engine. It's a glorified CRUD interface with two extra verbs for
/// moving files across the archive boundary ([`import`](Self::import) and
/// [`export`](Self::export)).
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations enforce
/// this validation. The only absolute paths accepted are the external
/// locations given to `import`/`export`.
///
/// # Overwrites
/// Nothing in the archive is ever overwritten by a move: `rename`, `import`
/// and `export` fail with [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists)
/// when the destination is occupied. Only [`write`](Self::write) replaces
/// existing content, and it does so atomically.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use lens_storage::{backend::StorageBackend, error::Result};
///
/// async fn index_size(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("_index.json");
///     if backend.exists(path).await? {
///         Ok(backend.read(path).await?.len() as u64)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// List all files matching an optional prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata (recursively) matching an optional prefix.
    ///
    /// The order of the yielded files is backend-specific; callers needing a
    /// deterministic order must sort. Asking for a prefix that doesn't exist
    /// yields an empty stream, not an error.
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file or directory exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Atomically write file contents, replacing any existing file.
    ///
    /// Concurrent readers observe either the previous content or the new
    /// content, never a partially written file.
    ///
    /// # Notes
    /// - Implementations should create parent directories as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Rename/move a file or a whole directory within the backend.
    ///
    /// # Notes
    /// - Implementations should create parent directories as needed
    /// - Fails with [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists)
    ///   when `to` exists.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Move a file from outside the archive (absolute `source`) to `to`.
    ///
    /// Either the file ends up at `to` and `source` is gone, or an error is
    /// returned and `source` is untouched.
    async fn import(&self, source: &Path, to: &Path) -> Result<()>;

    /// Move an archived file back out to an absolute `target` location.
    ///
    /// The inverse of [`import`](Self::import), used to roll back a
    /// placement that could not be completed.
    async fn export(&self, from: &Path, target: &Path) -> Result<()>;

    /// Absolute local filesystem location of an archive path, for handing
    /// to external tools. Backends without local files return
    /// [`BackendError`](crate::error::ErrorKind::BackendError).
    fn local_path(&self, path: &Path) -> Result<PathBuf>;
}
