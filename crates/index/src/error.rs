//! Index Error Types
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An index error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Reading or writing the index document through the storage backend failed.
    #[display("could not access index {}", _0.display())]
    Storage(#[error(not(source))] PathBuf),
    /// The index exists but isn't a valid index document. Never recreated
    /// automatically: it is the only record of what has been archived.
    #[display("index {} is corrupt", _0.display())]
    Corrupt(#[error(not(source))] PathBuf),
    #[display("could not serialize index")]
    Serialize,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
