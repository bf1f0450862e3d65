//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::StorageBackend;

/// Backend operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Delete,
    Rename,
    Import,
    Export,
}

/// In-memory storage backend for testing.
///
/// Files are stored in a `BTreeMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Directories are
/// implied by the paths of the files they contain. `import` and `export` do
/// touch the real filesystem on the external side, which lets tests stage an
/// inbox in a temporary directory and still inspect the archive in memory.
///
/// # Examples
///
/// ```
/// use lens_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([
///     ("2025/02/2025-02-26/photos/20250226_074104_A6401534.JPG", b"jpeg"),
/// ]);
/// assert!(backend.exists(Path::new("2025/02/2025-02-26")).await?);
///
/// backend.write(Path::new("_index.json"), b"{}").await?;
/// assert!(backend.exists(Path::new("_index.json")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<BTreeMap<PathBuf, (OffsetDateTime, Vec<u8>)>>,
    failures: Vec<(Operation, Option<PathBuf>)>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    ///
    /// # Example
    ///
    /// ```
    /// use lens_storage::backend::MockBackend;
    ///
    /// let backend = MockBackend::with_files([
    ///     ("_index.json", b"{}"),
    ///     ("2025/02/2025-02-26/photos/a.JPG", b"no"),
    /// ]);
    /// ```
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = BTreeMap::new();
        let now = OffsetDateTime::now_utc();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                // The panic here is DELIBERATE. MockBackend is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            failures: Vec::new(),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every `operation` touching `path` fail with a backend error.
    ///
    /// # Example
    ///
    /// ```
    /// use lens_storage::backend::{MockBackend, Operation};
    ///
    /// let backend = MockBackend::default().failing(Operation::Write, "_index.json");
    /// ```
    pub fn failing(mut self, operation: Operation, path: impl Into<PathBuf>) -> Self {
        self.failures.push((operation, Some(path.into())));
        self
    }

    /// Make every `operation` fail, whatever path it touches.
    pub fn failing_all(mut self, operation: Operation) -> Self {
        self.failures.push((operation, None));
        self
    }

    /// Snapshot of every stored path, in order.
    pub async fn paths(&self) -> Vec<PathBuf> {
        self.storage.read().await.keys().cloned().collect()
    }

    fn check(&self, operation: Operation, paths: &[&Path]) -> Result<()> {
        let injected = self.failures.iter().any(|(op, target)| {
            *op == operation && target.as_deref().is_none_or(|t| paths.iter().any(|p| *p == t))
        });
        if injected {
            exn::bail!(ErrorKind::BackendError(format!("injected {operation:?} failure")));
        }
        Ok(())
    }

    fn is_dir(guard: &BTreeMap<PathBuf, (OffsetDateTime, Vec<u8>)>, path: &Path) -> bool {
        guard.keys().any(|key| key != path && key.starts_with(path))
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| validated_prefix.as_ref().is_none_or(|pfx| path.starts_with(pfx)))
                    .map(|(path, (modified, data))| FileInfo::new(path.clone(), data.len() as u64, *modified))
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        Ok(guard.contains_key(&path) || Self::is_dir(&guard, &path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        self.check(Operation::Read, &[&path])?;
        let (_modified, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        self.check(Operation::Write, &[&path])?;
        self.storage.write().await.insert(path, (OffsetDateTime::now_utc(), data.to_vec()));
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.check(Operation::Delete, &[&path])?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from = validate_path(from)?;
        let to = validate_path(to)?;
        self.check(Operation::Rename, &[&from, &to])?;
        let mut guard = self.storage.write().await;
        if guard.contains_key(&to) || Self::is_dir(&guard, &to) {
            exn::bail!(ErrorKind::AlreadyExists(to));
        }
        if let Some(entry) = guard.remove(&from) {
            guard.insert(to, entry);
            return Ok(());
        }
        // Directory rename: move every file below `from`.
        let moved: Vec<PathBuf> = guard.keys().filter(|key| key.starts_with(&from)).cloned().collect();
        if moved.is_empty() {
            exn::bail!(ErrorKind::NotFound(from));
        }
        for key in moved {
            if let Some(entry) = guard.remove(&key)
                && let Ok(rest) = key.strip_prefix(&from)
            {
                guard.insert(to.join(rest), entry);
            }
        }
        Ok(())
    }

    async fn import(&self, source: &Path, to: &Path) -> Result<()> {
        let to = validate_path(to)?;
        self.check(Operation::Import, &[&to])?;
        if self.storage.read().await.contains_key(&to) {
            exn::bail!(ErrorKind::AlreadyExists(to));
        }
        let data = tokio::fs::read(source).await.map_err(|e| ErrorKind::from_io(e, source))?;
        let modified = tokio::fs::metadata(source)
            .await
            .and_then(|m| m.modified())
            .map(OffsetDateTime::from)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());
        tokio::fs::remove_file(source).await.map_err(|e| ErrorKind::from_io(e, source))?;
        self.storage.write().await.insert(to, (modified, data));
        Ok(())
    }

    async fn export(&self, from: &Path, target: &Path) -> Result<()> {
        let from = validate_path(from)?;
        self.check(Operation::Export, &[&from])?;
        if tokio::fs::try_exists(target).await.map_err(|e| ErrorKind::from_io(e, target))? {
            exn::bail!(ErrorKind::AlreadyExists(target.to_path_buf()));
        }
        let mut guard = self.storage.write().await;
        let (_modified, data) = guard.get(&from).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(from.clone())))?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, target))?;
        }
        tokio::fs::write(target, data).await.map_err(|e| ErrorKind::from_io(e, target))?;
        guard.remove(&from);
        Ok(())
    }

    fn local_path(&self, path: &Path) -> Result<PathBuf> {
        exn::bail!(ErrorKind::BackendError(format!("{} has no local file for {}", self.name, path.display())))
    }
}
