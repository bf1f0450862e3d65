//! Local filesystem storage backend.
//!
//! This module provides a storage backend implementation for the local filesystem.
//! Files are stored in a configured directory and accessed using standard filesystem
//! operations via `tokio::fs` for async I/O. Blocking work that has no async
//! counterpart (temp-file persistence, cross-device copies) runs inside
//! [`spawn_blocking`](tokio::task::spawn_blocking).

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// Stores files in a directory on the local filesystem. All paths are relative
/// to the configured root directory. Used for both the archive and the inbox.
///
/// # Examples
///
/// ```no_run
/// use lens_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("archive", "/path/to/archive")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalBackend {
    name: String,
    /// Root directory of the archive (or inbox)
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend, creating the root directory if
    /// it doesn't exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, is not a directory, or
    /// cannot be created.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Use non-async here; it'll only happen once per run and it's not
            // worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| ErrorKind::from_io(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    /// Open an existing directory without creating it.
    ///
    /// Returns [`NotFound`](ErrorKind::NotFound) if the directory doesn't
    /// exist. Used for the inbox, which must never be conjured into existence.
    pub fn open(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            exn::bail!(ErrorKind::NotFound(root));
        }
        Self::new(name, root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the absolute path for a relative storage path.
    ///
    /// Validates the path and joins it with the root directory.
    pub fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Convert an absolute path back to a relative storage path.
    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        if !absolute.is_absolute() {
            exn::bail!(ErrorKind::BackendError(format!(
                "attempting to get relative path of non-absolute path `{:?}`",
                absolute
            )))
        }
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        Ok(validate_path(relative)?)
    }

    /// Re-use same data collection from file metadata for both list and stat functions
    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(PathBuf::from(path), metadata.len(), modified))
    }

    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| ErrorKind::from_io(e, &path))?;
        let relative = self.relative_path(&path)?;
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
            && !pfx.starts_with(&relative)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if metadata.is_file() && prefix.is_none_or(|pfx| relative.starts_with(pfx)) {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Note: silently drop what is most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }

    async fn ensure_vacant(absolute: &Path, reported: &Path) -> Result<()> {
        if fs::try_exists(absolute).await.map_err(|e| ErrorKind::from_io(e, reported))? {
            exn::bail!(ErrorKind::AlreadyExists(reported.to_path_buf()));
        }
        Ok(())
    }

    async fn create_parent(absolute: &Path, reported: &Path) -> Result<()> {
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, reported))?;
        }
        Ok(())
    }
}

/// Moves `from` to `to`, both absolute, never overwriting `to`.
///
/// A plain rename when both sides live on the same filesystem, otherwise
/// [`copy_across`].
async fn relocate(from: PathBuf, to: PathBuf) -> Result<()> {
    match fs::rename(&from, &to).await {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            tracing::debug!(from = %from.display(), to = %to.display(), "Rename crosses devices; copying instead");
        },
        Err(e) => exn::bail!(ErrorKind::from_io(e, &from)),
    }
    tokio::task::spawn_blocking(move || copy_across(&from, &to, |path| std::fs::remove_file(path)))
        .await
        .or_raise(|| ErrorKind::BackendError("relocation task panicked".to_string()))?
}

/// Cross-device half of [`relocate`]. Blocking.
///
/// The content is copied into a temporary file next to `to`, synced,
/// persisted without clobbering, and only then is `from` removed with
/// `remove_source`. If that fails the copy is removed again so the file
/// exists in exactly one place.
fn copy_across(from: &Path, to: &Path, remove_source: impl FnOnce(&Path) -> std::io::Result<()>) -> Result<()> {
    let parent = to.parent().ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(to.to_path_buf())))?;
    let mut source = std::fs::File::open(from).map_err(|e| ErrorKind::from_io(e, from))?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| ErrorKind::from_io(e, to))?;
    std::io::copy(&mut source, &mut tmp).map_err(|e| ErrorKind::from_io(e, to))?;
    tmp.as_file().sync_all().map_err(|e| ErrorKind::from_io(e, to))?;
    tmp.persist_noclobber(to).map_err(|e| ErrorKind::from_io(e.error, to))?;
    drop(source);
    if let Err(e) = remove_source(from) {
        // Best effort: the copy must not outlive a source we couldn't remove.
        _ = std::fs::remove_file(to);
        exn::bail!(ErrorKind::from_io(e, from));
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        let mut stack = vec![self.root.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Asking for the contents of a directory that doesn't
                    // exist results in an empty list not an error.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(ErrorKind::from_io(err, &current)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(ErrorKind::from_io(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| ErrorKind::from_io(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        let reported = path.to_path_buf();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let parent = abs_path.parent().ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(reported.clone())))?;
            sync_create_dir(parent).map_err(|e| ErrorKind::from_io(e, &reported))?;
            // Same directory as the destination, so the final rename never
            // crosses a filesystem boundary.
            let mut tmp = NamedTempFile::new_in(parent).map_err(|e| ErrorKind::from_io(e, &reported))?;
            tmp.write_all(&data).map_err(|e| ErrorKind::from_io(e, &reported))?;
            tmp.as_file().sync_all().map_err(|e| ErrorKind::from_io(e, &reported))?;
            tmp.persist(&abs_path).map_err(|e| ErrorKind::from_io(e.error, &reported))?;
            Ok(())
        })
        .await
        .or_raise(|| ErrorKind::BackendError("write task panicked".to_string()))?
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| ErrorKind::from_io(e, path))?)
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from_path = self.absolute_path(from)?;
        let to_path = self.absolute_path(to)?;
        Self::ensure_vacant(&to_path, to).await?;
        Self::create_parent(&to_path, to).await?;
        Ok(fs::rename(&from_path, &to_path).await.map_err(|e| ErrorKind::from_io(e, from))?)
    }

    async fn import(&self, source: &Path, to: &Path) -> Result<()> {
        if !source.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(source.to_path_buf()));
        }
        let to_path = self.absolute_path(to)?;
        Self::ensure_vacant(&to_path, to).await?;
        Self::create_parent(&to_path, to).await?;
        relocate(source.to_path_buf(), to_path).await
    }

    async fn export(&self, from: &Path, target: &Path) -> Result<()> {
        if !target.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(target.to_path_buf()));
        }
        let from_path = self.absolute_path(from)?;
        Self::ensure_vacant(target, target).await?;
        Self::create_parent(target, target).await?;
        relocate(from_path, target.to_path_buf()).await
    }

    fn local_path(&self, path: &Path) -> Result<PathBuf> {
        self.absolute_path(path)
    }
}
