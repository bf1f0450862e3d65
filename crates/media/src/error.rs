//! Media Error Types
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.
//! Metadata problems for a single file never surface as errors from the
//! resolver (they become a fallback instead); these kinds describe the
//! provider itself misbehaving.

use derive_more::{Display, Error};

/// A media error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for media operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The external tool could not be found in `PATH`.
    #[display("{_0} not found in PATH")]
    ToolNotFound(#[error(not(source))] &'static str),
    /// The external tool ran but reported failure.
    #[display("{tool} failed: {detail}")]
    ToolFailed {
        tool: &'static str,
        #[error(not(source))]
        detail: String,
    },
    /// The external tool could not be spawned or waited on.
    #[display("could not run {_0}")]
    Spawn(#[error(not(source))] &'static str),
    /// The tool's output could not be understood.
    #[display("unexpected output from {_0}")]
    Output(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Spawn(_))
    }
}
