//! All-or-nothing placement of a primary asset and its sidecar.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use lens_storage::StorageBackend;
use std::path::Path;
use tracing::instrument;

/// One file crossing into the archive: absolute `source`, archive-relative
/// `destination`.
#[derive(Debug, Clone, Copy)]
pub struct Placement<'a> {
    pub source: &'a Path,
    pub destination: &'a Path,
}

/// Move `primary` (and `sidecar`, when present) into the archive.
///
/// Intermediate directories are created and nothing is ever overwritten. If
/// the sidecar can't follow, the primary is moved back out to where it came
/// from, so a failed placement leaves the inbox as it was.
#[instrument(skip_all, fields(backend = backend.name(), destination = %primary.destination.display()))]
pub async fn place(
    backend: &dyn StorageBackend,
    primary: Placement<'_>,
    sidecar: Option<Placement<'_>>,
) -> Result<()> {
    backend.import(primary.source, primary.destination).await.or_raise(|| ErrorKind::Storage)?;
    let Some(sidecar) = sidecar else {
        return Ok(());
    };
    if let Err(e) = backend.import(sidecar.source, sidecar.destination).await {
        tracing::debug!(error = ?e, sidecar = %sidecar.source.display(), "Sidecar placement failed; restoring primary");
        if let Err(restore) = backend.export(primary.destination, primary.source).await {
            // The primary stays in the archive without a record.
            tracing::error!(
                error = ?restore,
                archived = %primary.destination.display(),
                source = %primary.source.display(),
                "Could not move primary back to the inbox",
            );
        }
        return Err(e).or_raise(|| ErrorKind::Storage);
    }
    Ok(())
}
