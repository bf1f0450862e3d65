//! The session-scoped view of `_index.json`.

use crate::error::{ErrorKind, Result};
use crate::models::{ArchiveRecord, IndexDocument};
use exn::ResultExt;
use lens_media::MediaKind;
use lens_storage::BackendHandle;
use lens_storage::error::ErrorKind as StorageErrorKind;
use std::collections::HashSet;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::instrument;

/// Opaque copy of the store state, used to undo a failed multi-step change.
pub struct Checkpoint {
    document: IndexDocument,
    dirty: bool,
}

/// Durable mapping of archived files, loaded once per session.
///
/// Records are only ever appended; annotation may rewrite their paths. The
/// "already archived" check answers from the names present at load time so
/// that two inbox files with the same name in one run are both archived.
pub struct IndexStore {
    backend: BackendHandle,
    path: PathBuf,
    document: IndexDocument,
    archived: HashSet<String>,
    dirty: bool,
}
impl IndexStore {
    /// Load the index at `path` (relative to the archive root). A missing
    /// document starts empty; an unreadable or unparsable one is an error.
    #[instrument(skip_all, fields(backend = backend.name()))]
    pub async fn load(backend: BackendHandle, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = match backend.read(&path).await {
            Ok(bytes) => serde_json::from_slice::<IndexDocument>(&bytes).or_raise(|| ErrorKind::Corrupt(path.clone()))?,
            Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => {
                tracing::debug!(index = %path.display(), "No index yet; starting empty");
                IndexDocument::default()
            },
            Err(e) => return Err(e).or_raise(|| ErrorKind::Storage(path.clone())),
        };
        let mut store = Self {
            archived: document.files.iter().map(|r| r.original_name.clone()).collect(),
            backend,
            path,
            document,
            dirty: false,
        };
        if store.document.reconcile() {
            tracing::warn!(index = %store.path.display(), "Index totals or events were inconsistent; repaired");
            store.dirty = true;
        }
        tracing::debug!(records = store.document.files.len(), "Index loaded");
        Ok(store)
    }

    pub fn document(&self) -> &IndexDocument {
        &self.document
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether a file with this original name was archived by an earlier run.
    pub fn contains_original(&self, name: &str) -> bool {
        self.archived.contains(name)
    }

    /// Event label for a partition key, if annotated.
    pub fn label(&self, date: &str) -> Option<&str> {
        self.document.label(date)
    }

    pub fn append(&mut self, record: ArchiveRecord) {
        match record.kind {
            MediaKind::Photo => self.document.total_photos += 1,
            MediaKind::Video => self.document.total_videos += 1,
        }
        self.document.events.entry(record.date_key()).or_insert(None);
        self.document.files.push(record);
        self.dirty = true;
    }

    /// Record the label for a partition key.
    pub fn set_event(&mut self, date: &str, label: impl Into<String>) {
        self.document.events.insert(date.to_string(), Some(label.into()));
        self.dirty = true;
    }

    /// Rewrite the paths of every record captured on `date` from partition
    /// directory `from` to `to` (both relative to the archive root). Returns
    /// the number of records rewritten.
    pub fn relabel_partition(&mut self, date: &str, from: &str, to: &str) -> usize {
        let from = format!("{}/", from.trim_end_matches('/'));
        let to = format!("{}/", to.trim_end_matches('/'));
        let rewrite = |p: &str| p.strip_prefix(from.as_str()).map(|rest| format!("{to}{rest}"));
        let mut rewritten = 0;
        for record in self.document.files.iter_mut().filter(|r| r.date_key() == date) {
            if let Some(path) = rewrite(&record.path) {
                record.path = path;
                rewritten += 1;
            }
            if let Some(thumb) = record.thumbnail.as_deref().and_then(rewrite) {
                record.thumbnail = Some(thumb);
            }
        }
        if rewritten > 0 {
            self.dirty = true;
        }
        rewritten
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint { document: self.document.clone(), dirty: self.dirty }
    }

    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.document = checkpoint.document;
        self.dirty = checkpoint.dirty;
    }

    /// Atomically persist the document if anything changed since the last
    /// flush. Returns whether a write happened.
    #[instrument(skip(self), fields(index = %self.path.display()))]
    pub async fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        let previous = self.document.last_updated;
        self.document.last_updated = Some(OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()));
        let written = self.write().await;
        if written.is_err() {
            self.document.last_updated = previous;
        }
        written?;
        self.dirty = false;
        tracing::debug!(records = self.document.files.len(), "Index flushed");
        Ok(true)
    }

    async fn write(&self) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(&self.document).or_raise(|| ErrorKind::Serialize)?;
        bytes.push(b'\n');
        self.backend.write(&self.path, &bytes).await.or_raise(|| ErrorKind::Storage(self.path.clone()))
    }
}
