//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File or directory does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Destination already exists; backends never overwrite archived files.
    #[display("file already exists: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// The device ran out of space (or quota) mid-write.
    #[display("storage full: {}", _0.display())]
    StorageFull(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Path contains invalid characters or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Maps an I/O error onto the actionable categories, attributing it to `path`.
    pub fn from_io(err: IoError, path: impl Into<PathBuf>) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.into()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.into()),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.into()),
            std::io::ErrorKind::StorageFull | std::io::ErrorKind::QuotaExceeded => Self::StorageFull(path.into()),
            _ => Self::Io(err),
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind as IoKind;

    #[test]
    fn test_from_io_maps_known_kinds() {
        let kind = ErrorKind::from_io(IoError::from(IoKind::NotFound), "a.jpg");
        assert!(matches!(kind, ErrorKind::NotFound(p) if p == PathBuf::from("a.jpg")));
        let kind = ErrorKind::from_io(IoError::from(IoKind::PermissionDenied), "a.jpg");
        assert!(matches!(kind, ErrorKind::PermissionDenied(_)));
        let kind = ErrorKind::from_io(IoError::from(IoKind::StorageFull), "a.jpg");
        assert!(matches!(kind, ErrorKind::StorageFull(_)));
        let kind = ErrorKind::from_io(IoError::from(IoKind::Interrupted), "a.jpg");
        assert!(matches!(kind, ErrorKind::Io(_)));
    }

    #[test]
    fn test_retryable() {
        assert!(!ErrorKind::NotFound(PathBuf::from("x")).is_retryable());
        assert!(!ErrorKind::AlreadyExists(PathBuf::from("x")).is_retryable());
        assert!(ErrorKind::BackendError("flaky".into()).is_retryable());
    }
}
