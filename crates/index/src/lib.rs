//! The archive index: a JSON document at the archive root recording every
//! archived file and the event labels of date partitions. It is the source
//! of truth for skipping already-archived files on later runs.

pub mod error;
mod models;
mod store;

pub use crate::models::{ArchiveRecord, IndexDocument, date_key};
pub use crate::store::{Checkpoint, IndexStore};
