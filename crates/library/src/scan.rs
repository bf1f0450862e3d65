//! Inbox discovery and sidecar pairing.

use crate::error::{ErrorKind, Result};
use crate::report::{Disposition, FileOutcome, Issue};
use exn::ResultExt;
use lens_media::{Classification, DeviceFilter, MediaKind, SourceFile};
use lens_storage::BackendHandle;
use lens_storage::backend::LocalBackend;
use lens_storage::error::ErrorKind as StorageErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Open the inbox. It must already exist: a missing inbox is a mistake, not
/// an empty one.
pub fn open_inbox(path: &Path) -> Result<BackendHandle> {
    match LocalBackend::open("inbox", path) {
        Ok(backend) => Ok(Arc::new(backend)),
        Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => {
            Err(e).or_raise(|| ErrorKind::InputMissing(path.to_path_buf()))
        },
        Err(e) => Err(e).or_raise(|| ErrorKind::Storage),
    }
}

/// One unit of work for the engine, in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Work {
    /// A primary asset, with the sidecar that travels with it.
    Primary { file: SourceFile, sidecar: Option<SourceFile> },
    /// Nothing to do but report.
    Skip(FileOutcome),
}
impl Work {
    pub fn source(&self) -> &Path {
        match self {
            Self::Primary { file, .. } => &file.relative,
            Self::Skip(outcome) => &outcome.source,
        }
    }
}

/// List and classify every file in the inbox, sorted by relative path.
#[instrument(skip_all, fields(inbox = inbox.name()))]
pub async fn discover(inbox: &BackendHandle, filter: &DeviceFilter) -> Result<Vec<SourceFile>> {
    let mut listed = inbox.list(None).await.or_raise(|| ErrorKind::Storage)?;
    listed.sort_by(|a, b| a.path.cmp(&b.path));
    let files = listed
        .into_iter()
        .map(|info| -> Result<SourceFile> {
            let absolute = inbox.local_path(&info.path).or_raise(|| ErrorKind::Storage)?;
            Ok(SourceFile::inspect(filter, info.path, absolute, info.size, info.modified))
        })
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(files = files.len(), "Inbox listed");
    Ok(files)
}

/// Turn classified files into work: discards become outcomes, each sidecar
/// is attached to the video it belongs to, and sidecars without a video in
/// the same directory are left where they are.
///
/// A video takes at most one sidecar (the first by name); any others for the
/// same video are treated as orphans.
pub fn pair(files: Vec<SourceFile>) -> Vec<Work> {
    let (sidecars, others): (Vec<_>, Vec<_>) =
        files.into_iter().partition(|f| matches!(f.classification, Classification::Sidecar { .. }));
    let mut sidecars: Vec<Option<SourceFile>> = sidecars.into_iter().map(Some).collect();

    let mut work = Vec::with_capacity(others.len() + sidecars.len());
    for file in others {
        match file.classification.clone() {
            Classification::Discard(reason) => {
                tracing::debug!(file = %file.relative.display(), %reason, "Skipped");
                work.push(Work::Skip(FileOutcome::new(file.relative, Disposition::Discarded(reason))));
            },
            Classification::Primary(MediaKind::Video) => {
                let sidecar = sidecars
                    .iter_mut()
                    .find(|s| s.as_ref().is_some_and(|s| belongs_to(s, &file)))
                    .and_then(Option::take);
                work.push(Work::Primary { file, sidecar });
            },
            Classification::Primary(MediaKind::Photo) => work.push(Work::Primary { file, sidecar: None }),
            Classification::Sidecar { .. } => {},
        }
    }
    for orphan in sidecars.into_iter().flatten() {
        let outcome = FileOutcome::new(orphan.relative, Disposition::LeftInPlace).with_issue(Issue::OrphanSidecar);
        work.push(Work::Skip(outcome));
    }
    work.sort_by(|a, b| a.source().cmp(b.source()));
    work
}

fn belongs_to(sidecar: &SourceFile, video: &SourceFile) -> bool {
    let Classification::Sidecar { primary_stem } = &sidecar.classification else {
        return false;
    };
    let (stem, _) = video.stem_and_extension();
    sidecar.relative.parent() == video.relative.parent() && primary_stem.eq_ignore_ascii_case(&stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{FileTime, set_file_mtime};
    use lens_media::DiscardReason;
    use std::path::PathBuf;
    use time::OffsetDateTime;

    fn source(relative: &str) -> SourceFile {
        SourceFile::inspect(&DeviceFilter::default(), relative, format!("/inbox/{relative}"), 1, OffsetDateTime::UNIX_EPOCH)
    }

    fn sources(work: &[Work]) -> Vec<PathBuf> {
        work.iter().map(|w| w.source().to_path_buf()).collect()
    }

    #[test]
    fn test_pairs_sidecar_in_same_directory() {
        let work = pair(vec![
            source("PRIVATE/M4ROOT/CLIP/C0001.MP4"),
            source("PRIVATE/M4ROOT/CLIP/C0001M01.XML"),
            source("DCIM/C0002.MP4"),
            source("PRIVATE/M4ROOT/CLIP/C0002M01.XML"),
        ]);
        assert_eq!(work.len(), 3);
        let Work::Primary { sidecar: Some(sidecar), .. } = &work[1] else {
            panic!("expected C0001 with its sidecar, got {:?}", work[1]);
        };
        assert_eq!(sidecar.name(), "C0001M01.XML");
        // Different directory: C0002 goes alone and its sidecar stays put.
        assert!(matches!(&work[0], Work::Primary { sidecar: None, .. }));
        let Work::Skip(orphan) = &work[2] else {
            panic!("expected an orphan, got {:?}", work[2]);
        };
        assert_eq!(orphan.disposition, Disposition::LeftInPlace);
        assert_eq!(orphan.issues, vec![Issue::OrphanSidecar]);
    }

    #[test]
    fn test_one_sidecar_per_video() {
        let work = pair(vec![source("C0001.MP4"), source("C0001M01.XML"), source("C0001M02.XML")]);
        assert_eq!(sources(&work), [Path::new("C0001.MP4"), Path::new("C0001M02.XML")]);
        assert!(matches!(&work[0], Work::Primary { sidecar: Some(s), .. } if s.name() == "C0001M01.XML"));
        assert!(matches!(&work[1], Work::Skip(o) if o.issues == [Issue::OrphanSidecar]));
    }

    #[test]
    fn test_discards_become_outcomes() {
        let work = pair(vec![
            source("._A6401534.JPG"),
            source("GL010001.LRV"),
            source("notes.txt"),
            source("A6401534.JPG"),
        ]);
        let discarded: Vec<_> = work
            .iter()
            .filter_map(|w| match w {
                Work::Skip(FileOutcome { disposition: Disposition::Discarded(reason), .. }) => Some(*reason),
                _ => None,
            })
            .collect();
        assert_eq!(discarded, [DiscardReason::AppleDouble, DiscardReason::Auxiliary, DiscardReason::Unsupported]);
        assert!(matches!(&work[1], Work::Primary { file, .. } if file.name() == "A6401534.JPG"));
    }

    #[tokio::test]
    async fn test_discover_sorted_with_local_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/DSC00002.JPG"), b"2").unwrap();
        std::fs::write(dir.path().join("DSC00001.JPG"), b"11").unwrap();
        set_file_mtime(dir.path().join("DSC00001.JPG"), FileTime::from_unix_time(1_735_264_800, 0)).unwrap();

        let inbox = open_inbox(dir.path()).unwrap();
        let files = discover(&inbox, &DeviceFilter::default()).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].relative, Path::new("DSC00001.JPG"));
        assert_eq!(files[0].absolute, dir.path().join("DSC00001.JPG"));
        assert_eq!(files[0].size, 2);
        assert_eq!(files[0].modified.unix_timestamp(), 1_735_264_800);
        assert_eq!(files[1].relative, Path::new("b/DSC00002.JPG"));
    }

    #[test]
    fn test_missing_inbox() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_inbox(&dir.path().join("_inbox")).err().unwrap();
        assert!(matches!(&*err, ErrorKind::InputMissing(_)));
    }
}
