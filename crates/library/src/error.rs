//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Only the things that stop a whole
//! run (or a whole annotation) are errors; per-file problems are reported as
//! [`Issue`](crate::Issue)s on the file's outcome instead.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("issue with file name generation from template")]
    Template,
    #[display("configuration is unusable")]
    Config,
    /// A storage backend operation failed.
    #[display("archive storage operation failed")]
    Storage,
    /// The index could not be loaded or persisted.
    #[display("index could not be loaded or saved")]
    Index,
    /// The metadata provider isn't installed.
    #[display("metadata provider not available")]
    MetadataProvider,
    /// No supported image tool is installed while thumbnails are enabled.
    #[display("no thumbnail tool found in PATH (tried {_0})")]
    ThumbnailerNotFound(#[error(not(source))] String),
    /// A thumbnail tool ran but failed.
    #[display("thumbnail generation failed")]
    Thumbnail,
    #[display("input directory {} does not exist", _0.display())]
    InputMissing(#[error(not(source))] PathBuf),
    /// Names the archive backend that refused the write check.
    #[display("archive `{_0}` is not writable")]
    ArchiveNotWritable(#[error(not(source))] String),
    /// Every suffix up to the limit is taken.
    #[display("no free name for {_0}")]
    Collision(#[error(not(source))] String),
    /// An event label could not be applied; the partition is unchanged.
    #[display("could not annotate {date}: {reason}")]
    AnnotationFailed {
        date: String,
        #[error(not(source))]
        reason: String,
    },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Index)
    }
}
