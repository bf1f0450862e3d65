//! Archive storage for lens-sorter.
//!
//! Everything the organizing engine does to the archive goes through a
//! [`StorageBackend`]: listing, relocating files into the archive, renaming
//! date partitions and atomically rewriting the index document. Paths handed
//! to a backend are always relative to its root and validated by
//! [`validate_path`].

pub mod backend;
pub mod error;
pub mod file;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::file::FileInfo;
pub use crate::path::{validate as validate_path, validate_segment};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
