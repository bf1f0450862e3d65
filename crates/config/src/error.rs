//! Config Error Types

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A layer could not be read or didn't match the expected shape.
    #[display("could not load configuration")]
    Load,
    /// The merged configuration is well-formed but unusable.
    #[display("invalid configuration value for `{key}`: {reason}")]
    Invalid {
        key: &'static str,
        #[error(not(source))]
        reason: String,
    },
    #[display("could not resolve path {_0}")]
    Path(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
