//! CLI Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration could not be loaded")]
    Config,
    #[display("could not open run log {}", _0.display())]
    Log(#[error(not(source))] PathBuf),
    #[display("could not open the archive")]
    Archive,
    #[display("could not start organizing")]
    Setup,
    #[display("organizing stopped early")]
    Organize,
    #[display("annotation failed")]
    Annotate,
}

impl ErrorKind {
    /// Returns `true` if running the same command again might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Archive | Self::Organize)
    }
}
