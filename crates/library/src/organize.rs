//! The organizing engine.
//!
//! [`organize`] walks the inbox in sorted order and, for every primary asset,
//! resolves metadata, plans a destination, places the file (and its sidecar),
//! generates a thumbnail for photos and appends an index record. Progress is
//! reported as a stream of [`OrganizeEvent`]s.
//!
//! Only metadata resolution runs ahead of the current file (it changes
//! nothing); everything else happens one file at a time, in order.

use crate::Context;
use crate::error::{ErrorKind, Result};
use crate::mover::{Placement, place};
use crate::plan::Plan;
use crate::report::{Disposition, FileOutcome, Issue, RunReport};
use crate::scan::{Work, discover, pair};
use crate::session::Session;
use async_stream::stream;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use lens_index::ArchiveRecord;
use lens_media::{MediaKind, ResolvedMetadata, SourceFile};
use lens_storage::BackendHandle;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Progress events emitted by [`organize`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once.
/// 2. [`DiscoveryComplete`](Self::DiscoveryComplete): exactly once, with the
///    number of inbox files found.
/// 3. [`Processed`](Self::Processed): once per inbox file handled, in sorted
///    path order. A sidecar travels with its video and has no event of its
///    own, unless the video was already archived: then the sidecar is
///    reported as [`LeftInPlace`](Disposition::LeftInPlace) right after it.
/// 4. [`Complete`](Self::Complete): exactly once, after the index was flushed.
///
/// A fatal error terminates the stream early, in which case
/// [`Complete`](Self::Complete) is never emitted.
#[derive(Debug)]
pub enum OrganizeEvent {
    Started,
    DiscoveryComplete(u64),
    Processed(Box<FileOutcome>),
    /// The run is over; [`RunReport::cancelled`] tells whether it was cut short.
    Complete(RunReport),
}

/// [`Work`] with its metadata resolved.
enum Ready {
    Primary { file: SourceFile, sidecar: Option<SourceFile>, metadata: ResolvedMetadata },
    Skip(FileOutcome),
}

/// Organize everything in `inbox` into the session's archive.
///
/// Cancelling `cancel` stops the run at the next file boundary: a file already
/// being placed is finished, no further file is started (even if its metadata
/// was already read), the index is flushed and the remaining files stay where
/// they are.
pub fn organize<'a>(
    session: &'a mut Session,
    ctx: &'a Context,
    inbox: &'a BackendHandle,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<OrganizeEvent>> + 'a {
    stream!({
        yield Ok(OrganizeEvent::Started);

        let files = match discover(inbox, &ctx.filter).await {
            Ok(files) => files,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
        yield Ok(OrganizeEvent::DiscoveryComplete(u64::try_from(files.len()).unwrap_or(0)));

        let mut report = RunReport { dry_run: session.is_dry_run(), ..Default::default() };
        // Resume check answers from the index as loaded, so decide up front
        // and don't bother reading metadata for files that will be skipped.
        let work: Vec<Work> = pair(files)
            .into_iter()
            .flat_map(|work| match work {
                Work::Primary { file, sidecar } if session.index().contains_original(&file.name()) => {
                    tracing::debug!(file = %file.relative.display(), "Already archived");
                    let sidecar = sidecar.map(|s| Work::Skip(FileOutcome::new(s.relative, Disposition::LeftInPlace)));
                    std::iter::once(Work::Skip(FileOutcome::new(file.relative, Disposition::AlreadyArchived)))
                        .chain(sidecar)
                        .collect::<Vec<_>>()
                },
                work => vec![work],
            })
            .collect();

        let resolver = &ctx.resolver;
        let mut pending = futures::stream::iter(work)
            .map(|work| async move {
                match work {
                    Work::Primary { file, sidecar } => {
                        let metadata = resolver.resolve(&file).await;
                        Ready::Primary { file, sidecar, metadata }
                    },
                    Work::Skip(outcome) => Ready::Skip(outcome),
                }
            })
            .buffered(ctx.metadata_concurrency.max(1));

        let mut since_flush = 0;
        while let Some(ready) = pending.next().await {
            // Checked before placing, so a file whose metadata was read after
            // the request stays in the inbox.
            if cancel.is_cancelled() {
                tracing::info!("Cancellation requested; stopping before the next file");
                report.cancelled = true;
                break;
            }
            let outcome = match ready {
                Ready::Primary { file, sidecar, metadata } => {
                    let outcome = organize_file(session, ctx, &file, sidecar.as_ref(), metadata).await;
                    if outcome.record().is_some() {
                        since_flush += 1;
                    }
                    outcome
                },
                Ready::Skip(outcome) => outcome,
            };
            report.add(&outcome);
            yield Ok(OrganizeEvent::Processed(Box::new(outcome)));

            if since_flush >= ctx.flush_every {
                if let Err(e) = session.flush().await {
                    yield Err(e);
                    return;
                }
                since_flush = 0;
            }
        }
        // A request during the last file still counts.
        report.cancelled |= cancel.is_cancelled();
        // Dropping the read-ahead stops any metadata lookups still running.
        drop(pending);

        if let Err(e) = session.flush().await {
            yield Err(e);
            return;
        }
        yield Ok(OrganizeEvent::Complete(report));
    })
}

/// Archive one primary asset. Never fails: problems become issues on the
/// returned outcome.
pub async fn organize_file(
    session: &mut Session,
    ctx: &Context,
    file: &SourceFile,
    sidecar: Option<&SourceFile>,
    metadata: ResolvedMetadata,
) -> FileOutcome {
    let mut outcome = FileOutcome::new(file.relative.clone(), Disposition::Failed);
    if let Some(reason) = metadata.fallback() {
        outcome.issues.push(Issue::MetadataUnavailable(reason.clone()));
    }

    let label = session.index().label(&lens_index::date_key(metadata.captured.date())).map(str::to_string);
    let plan = match ctx
        .planner
        .plan(file, &metadata, sidecar, label.as_deref(), session.claims(), session.backend().as_ref())
        .await
    {
        Ok(plan) => plan,
        Err(e) => {
            outcome.issues.push(Issue::MoveFailed(e.to_string()));
            return outcome;
        },
    };
    let primary = Placement { source: &file.absolute, destination: Path::new(&plan.path) };
    let sidecar_placement = match (sidecar, &plan.sidecar) {
        (Some(sidecar), Some(destination)) => {
            Some(Placement { source: &sidecar.absolute, destination: Path::new(destination) })
        },
        _ => None,
    };
    if let Err(e) = place(session.backend().as_ref(), primary, sidecar_placement).await {
        outcome.issues.push(Issue::MoveFailed(e.to_string()));
        return outcome;
    }
    session.claims_mut().claim(&plan);
    if let Some(suffix) = plan.suffix {
        outcome.issues.push(Issue::NameCollision(suffix));
    }
    if plan.kind == MediaKind::Video && sidecar.is_none() {
        outcome.issues.push(Issue::SidecarMissing);
    }

    let thumbnail = match thumbnail(session, ctx, &plan).await {
        Ok(thumbnail) => thumbnail,
        Err(e) => {
            outcome.issues.push(Issue::ThumbnailFailed(e.to_string()));
            None
        },
    };
    let record = ArchiveRecord {
        original_name: file.name(),
        new_name: plan.file_name,
        path: plan.path,
        thumbnail,
        datetime: metadata.captured,
        kind: plan.kind,
        size_bytes: file.size,
        camera: metadata.device,
    };
    tracing::debug!(file = %file.relative.display(), path = %record.path, "Archived");
    session.index_mut().append(record.clone());
    outcome.disposition = Disposition::Archived(Box::new(record));
    outcome
}

/// Thumbnail the freshly placed photo. `Ok(None)` when there's nothing to do
/// (videos, thumbnails disabled, dry run).
async fn thumbnail(session: &Session, ctx: &Context, plan: &Plan) -> Result<Option<String>> {
    let (Some(thumbnailer), Some(target)) = (&ctx.thumbnailer, &plan.thumbnail) else {
        return Ok(None);
    };
    if session.is_dry_run() {
        return Ok(None);
    }
    let backend = session.backend();
    let source = backend.local_path(Path::new(&plan.path)).or_raise(|| ErrorKind::Storage)?;
    let target_local = backend.local_path(Path::new(target)).or_raise(|| ErrorKind::Storage)?;
    thumbnailer.generate(&source, &target_local, ctx.thumbnail_width).await?;
    Ok(Some(target.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PathPlanner;
    use crate::thumbnail::Thumbnailer;
    use async_trait::async_trait;
    use filetime::{FileTime, set_file_mtime};
    use lens_media::error::ErrorKind as MediaErrorKind;
    use lens_media::{DeviceFilter, DiscardReason, FallbackReason, MetadataProvider, MetadataResolver, Tags};
    use lens_storage::StorageBackend;
    use lens_storage::backend::{LocalBackend, MockBackend, Operation};
    use rstest::rstest;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use time::UtcOffset;

    /// Tags by file name; anything else makes the provider fail.
    struct Tagged;
    #[async_trait]
    impl MetadataProvider for Tagged {
        async fn read_tags(&self, path: &Path) -> lens_media::error::Result<Tags> {
            let tags = |original: Option<&str>, create: Option<&str>| Tags {
                date_time_original: original.map(str::to_string),
                create_date: create.map(str::to_string),
                model: Some("ILCE-6400".into()),
            };
            match path.file_name().and_then(|n| n.to_str()).unwrap_or_default() {
                "A6401534.JPG" | "DSC00001.JPG" | "DSC00002.JPG" => Ok(tags(Some("2025:02:26 07:41:04"), None)),
                "C0001.MP4" | "C0002.MP4" => Ok(tags(None, Some("2024:12:27 10:15:00"))),
                _ => exn::bail!(MediaErrorKind::Spawn("exiftool")),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        fail: bool,
        /// Cancelled as soon as the first thumbnail is requested.
        cancel: Option<CancellationToken>,
        calls: Mutex<Vec<PathBuf>>,
    }
    #[async_trait]
    impl Thumbnailer for Recorder {
        async fn generate(&self, source: &Path, target: &Path, width: u32) -> Result<()> {
            assert_eq!(width, 320);
            self.calls.lock().unwrap().push(source.to_path_buf());
            if let Some(cancel) = &self.cancel {
                cancel.cancel();
            }
            if self.fail {
                exn::bail!(ErrorKind::Thumbnail);
            }
            tokio::fs::create_dir_all(target.parent().unwrap()).await.unwrap();
            tokio::fs::write(target, b"thumb").await.unwrap();
            Ok(())
        }
    }

    struct Fixture {
        inbox: TempDir,
        archive: TempDir,
        thumbnailer: Arc<Recorder>,
        flush_every: usize,
    }
    impl Fixture {
        fn new() -> Self {
            Self {
                inbox: tempfile::tempdir().unwrap(),
                archive: tempfile::tempdir().unwrap(),
                thumbnailer: Arc::default(),
                flush_every: 50,
            }
        }

        fn put(&self, relative: &str) -> PathBuf {
            let path = self.inbox.path().join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, relative.as_bytes()).unwrap();
            path
        }

        fn context(&self) -> Context {
            Context {
                filter: DeviceFilter::default(),
                resolver: MetadataResolver::new(Arc::new(Tagged)).with_offset(UtcOffset::UTC),
                planner: PathPlanner::default(),
                thumbnailer: Some(self.thumbnailer.clone() as Arc<dyn Thumbnailer>),
                thumbnail_width: 320,
                metadata_concurrency: 4,
                flush_every: self.flush_every,
            }
        }

        async fn session(&self, dry_run: bool) -> Session {
            let archive = Arc::new(LocalBackend::new("archive", self.archive.path()).unwrap());
            Session::open(archive, "_index.json", dry_run).await.unwrap()
        }

        /// Run to completion and return the per-file outcomes and the report.
        async fn run(&self, dry_run: bool, cancel: CancellationToken) -> (Vec<FileOutcome>, RunReport) {
            let mut session = self.session(dry_run).await;
            let ctx = self.context();
            let inbox = crate::scan::open_inbox(self.inbox.path()).unwrap();
            let events: Vec<OrganizeEvent> =
                organize(&mut session, &ctx, &inbox, cancel).map(|event| event.unwrap()).collect().await;

            assert!(matches!(events.first(), Some(OrganizeEvent::Started)));
            assert!(matches!(events.get(1), Some(OrganizeEvent::DiscoveryComplete(_))));
            let mut outcomes = Vec::new();
            let mut report = None;
            for event in events.into_iter().skip(2) {
                match event {
                    OrganizeEvent::Processed(outcome) => outcomes.push(*outcome),
                    OrganizeEvent::Complete(done) => report = Some(done),
                    other => panic!("unexpected event {other:?}"),
                }
            }
            (outcomes, report.expect("run did not complete"))
        }

        fn archived(&self, relative: &str) -> bool {
            self.archive.path().join(relative).is_file()
        }

        fn index(&self) -> serde_json::Value {
            serde_json::from_slice(&std::fs::read(self.archive.path().join("_index.json")).unwrap()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_archives_photo() {
        let fixture = Fixture::new();
        let source = fixture.put("DCIM/100MSDCF/A6401534.JPG");

        let (outcomes, report) = fixture.run(false, CancellationToken::new()).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].issues, []);
        let record = outcomes[0].record().unwrap();
        assert_eq!(record.path, "2025/02/2025-02-26/photos/20250226_074104_A6401534.JPG");
        assert_eq!(record.new_name, "20250226_074104_A6401534.JPG");
        assert_eq!(record.thumbnail.as_deref(), Some("2025/02/2025-02-26/thumbnails/20250226_074104_A6401534_thumb.JPG"));

        assert!(!source.exists());
        assert!(fixture.archived(&record.path));
        assert!(fixture.archived(record.thumbnail.as_deref().unwrap()));
        assert_eq!(*fixture.thumbnailer.calls.lock().unwrap(), [fixture.archive.path().join(&record.path)]);

        assert_eq!((report.photos, report.videos, report.warnings), (1, 0, 0));
        assert_eq!(report.touched.keys().collect::<Vec<_>>(), ["2025-02-26"]);
        let index = fixture.index();
        assert_eq!(index["total_photos"], 1);
        assert_eq!(index["files"][0]["original_name"], "A6401534.JPG");
        assert_eq!(index["events"]["2025-02-26"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_second_run_leaves_index_untouched() {
        let fixture = Fixture::new();
        fixture.put("A6401534.JPG");
        fixture.run(false, CancellationToken::new()).await;
        let before = std::fs::read(fixture.archive.path().join("_index.json")).unwrap();

        // The same card inserted again.
        let source = fixture.put("A6401534.JPG");
        let (outcomes, report) = fixture.run(false, CancellationToken::new()).await;
        assert_eq!(outcomes[0].disposition, Disposition::AlreadyArchived);
        assert_eq!((report.photos, report.already_archived), (0, 1));
        assert!(source.exists());
        assert_eq!(std::fs::read(fixture.archive.path().join("_index.json")).unwrap(), before);
    }

    #[tokio::test]
    async fn test_falls_back_to_modification_time() {
        let fixture = Fixture::new();
        let source = fixture.put("DSC09999.JPG");
        set_file_mtime(&source, FileTime::from_unix_time(1_735_264_800, 0)).unwrap();

        let (outcomes, report) = fixture.run(false, CancellationToken::new()).await;
        assert_eq!(outcomes[0].issues.len(), 1);
        assert!(matches!(&outcomes[0].issues[0], Issue::MetadataUnavailable(FallbackReason::ProviderFailed(_))));
        assert_eq!(outcomes[0].record().unwrap().path, "2024/12/2024-12-27/photos/20241227_020000_DSC09999.JPG");
        assert_eq!(report.warnings, 1);
    }

    #[tokio::test]
    async fn test_same_name_from_two_folders() {
        let fixture = Fixture::new();
        fixture.put("DCIM/100MSDCF/DSC00001.JPG");
        fixture.put("DCIM/101MSDCF/DSC00001.JPG");

        let (outcomes, report) = fixture.run(false, CancellationToken::new()).await;
        let paths: Vec<_> = outcomes.iter().map(|o| o.record().unwrap().path.as_str()).collect();
        assert_eq!(
            paths,
            [
                "2025/02/2025-02-26/photos/20250226_074104_DSC00001.JPG",
                "2025/02/2025-02-26/photos/20250226_074104_DSC00001_1.JPG",
            ]
        );
        assert_eq!(outcomes[1].issues, [Issue::NameCollision(1)]);
        assert_eq!((report.photos, report.warnings), (2, 0));
        assert!(paths.iter().all(|p| fixture.archived(p)));
    }

    #[tokio::test]
    async fn test_existing_archive_file_is_never_overwritten() {
        let fixture = Fixture::new();
        let taken = fixture.archive.path().join("2025/02/2025-02-26/photos/20250226_074104_DSC00002.JPG");
        std::fs::create_dir_all(taken.parent().unwrap()).unwrap();
        std::fs::write(&taken, b"already here").unwrap();
        fixture.put("DSC00002.JPG");

        let (outcomes, _) = fixture.run(false, CancellationToken::new()).await;
        assert_eq!(outcomes[0].record().unwrap().new_name, "20250226_074104_DSC00002_1.JPG");
        assert_eq!(std::fs::read(&taken).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn test_discards_stay_in_inbox() {
        let fixture = Fixture::new();
        let junk: Vec<_> = ["._A6401534.JPG", "DCIM/100GOPRO/GL010001.LRV", "notes.txt"]
            .into_iter()
            .map(|name| fixture.put(name))
            .collect();
        fixture.put("A6401534.JPG");

        let (outcomes, report) = fixture.run(false, CancellationToken::new()).await;
        let discarded: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o.disposition {
                Disposition::Discarded(reason) => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(discarded, [DiscardReason::AppleDouble, DiscardReason::Auxiliary, DiscardReason::Unsupported]);
        assert_eq!((report.photos, report.discarded), (1, 3));
        assert!(junk.iter().all(|path| path.exists()));
        assert_eq!(fixture.index()["files"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_video_travels_with_sidecar() {
        let fixture = Fixture::new();
        fixture.put("PRIVATE/M4ROOT/CLIP/C0001.MP4");
        fixture.put("PRIVATE/M4ROOT/CLIP/C0001M01.XML");
        fixture.put("PRIVATE/M4ROOT/CLIP/C0002.MP4");

        let (outcomes, report) = fixture.run(false, CancellationToken::new()).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].issues, []);
        assert_eq!(outcomes[0].record().unwrap().thumbnail, None);
        assert!(fixture.archived("2024/12/2024-12-27/videos/20241227_101500_C0001.MP4"));
        assert!(fixture.archived("2024/12/2024-12-27/videos/20241227_101500_C0001M01.XML"));
        assert_eq!(outcomes[1].issues, [Issue::SidecarMissing]);
        assert!(fixture.archived("2024/12/2024-12-27/videos/20241227_101500_C0002.MP4"));

        assert_eq!((report.videos, report.warnings), (2, 1));
        assert!(fixture.thumbnailer.calls.lock().unwrap().is_empty());
        // Sidecars aren't indexed.
        assert_eq!(fixture.index()["files"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let fixture = Fixture::new();
        let source = fixture.put("A6401534.JPG");

        let (outcomes, report) = fixture.run(true, CancellationToken::new()).await;
        let record = outcomes[0].record().unwrap();
        assert_eq!(record.path, "2025/02/2025-02-26/photos/20250226_074104_A6401534.JPG");
        assert_eq!(record.thumbnail, None);
        assert!(report.dry_run);
        assert_eq!(report.photos, 1);

        assert!(source.exists());
        assert!(!fixture.archived(&record.path));
        assert!(!fixture.archive.path().join("_index.json").exists());
        assert!(fixture.thumbnailer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_thumbnail_still_archives() {
        let mut fixture = Fixture::new();
        fixture.thumbnailer = Arc::new(Recorder { fail: true, ..Default::default() });
        fixture.put("A6401534.JPG");

        let (outcomes, report) = fixture.run(false, CancellationToken::new()).await;
        assert!(matches!(outcomes[0].issues.as_slice(), [Issue::ThumbnailFailed(_)]));
        assert_eq!(outcomes[0].record().unwrap().thumbnail, None);
        assert_eq!(fixture.index()["files"][0]["thumbnail"], serde_json::Value::Null);
        assert_eq!((report.photos, report.warnings), (1, 1));
    }

    #[tokio::test]
    async fn test_already_archived_video_keeps_its_sidecar() {
        let fixture = Fixture::new();
        fixture.put("PRIVATE/M4ROOT/CLIP/C0001.MP4");
        fixture.put("PRIVATE/M4ROOT/CLIP/C0001M01.XML");
        fixture.run(false, CancellationToken::new()).await;

        let video = fixture.put("PRIVATE/M4ROOT/CLIP/C0001.MP4");
        let xml = fixture.put("PRIVATE/M4ROOT/CLIP/C0001M01.XML");
        let (outcomes, report) = fixture.run(false, CancellationToken::new()).await;
        let reported: Vec<_> = outcomes.iter().map(|o| (o.source.as_path(), &o.disposition)).collect();
        assert_eq!(
            reported,
            [
                (Path::new("PRIVATE/M4ROOT/CLIP/C0001.MP4"), &Disposition::AlreadyArchived),
                (Path::new("PRIVATE/M4ROOT/CLIP/C0001M01.XML"), &Disposition::LeftInPlace),
            ]
        );
        assert_eq!(outcomes[1].issues, []);
        assert_eq!((report.already_archived, report.warnings), (1, 0));
        assert!(video.exists());
        assert!(xml.exists());
    }

    #[tokio::test]
    async fn test_failed_move_leaves_file_in_inbox() {
        let fixture = Fixture::new();
        let stuck = fixture.put("A6401534.JPG");
        fixture.put("DSC00001.JPG");
        let mock = Arc::new(
            MockBackend::default()
                .failing(Operation::Import, "2025/02/2025-02-26/photos/20250226_074104_A6401534.JPG"),
        );
        let mut session = Session::open(mock.clone(), "_index.json", false).await.unwrap();
        let ctx = Context { thumbnailer: None, ..fixture.context() };
        let inbox = crate::scan::open_inbox(fixture.inbox.path()).unwrap();

        let outcomes: Vec<FileOutcome> = organize(&mut session, &ctx, &inbox, CancellationToken::new())
            .filter_map(|event| async move {
                match event.unwrap() {
                    OrganizeEvent::Processed(outcome) => Some(*outcome),
                    _ => None,
                }
            })
            .collect()
            .await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].disposition, Disposition::Failed);
        assert!(matches!(outcomes[0].issues.as_slice(), [Issue::MoveFailed(_)]));
        assert_eq!(outcomes[1].record().unwrap().path, "2025/02/2025-02-26/photos/20250226_074104_DSC00001.JPG");
        assert!(stuck.exists());

        let index: serde_json::Value =
            serde_json::from_slice(&mock.read(Path::new("_index.json")).await.unwrap()).unwrap();
        let files = index["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["original_name"], "DSC00001.JPG");
    }

    #[tokio::test]
    async fn test_cancel_before_start_archives_nothing() {
        let fixture = Fixture::new();
        let sources = [fixture.put("A6401534.JPG"), fixture.put("DSC00001.JPG")];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (outcomes, report) = fixture.run(false, cancel).await;
        assert!(outcomes.is_empty());
        assert!(report.cancelled);
        assert!(sources.iter().all(|path| path.exists()));
        assert!(!fixture.archive.path().join("_index.json").exists());
    }

    #[tokio::test]
    async fn test_cancel_stops_at_file_boundary() {
        let mut fixture = Fixture::new();
        let cancel = CancellationToken::new();
        fixture.thumbnailer = Arc::new(Recorder { cancel: Some(cancel.clone()), ..Default::default() });
        fixture.put("A6401534.JPG");
        let untouched = fixture.put("DSC00001.JPG");

        // Metadata for the second file is read ahead, but it's never placed.
        let (outcomes, report) = fixture.run(false, cancel).await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].record().is_some());
        assert!(report.cancelled);
        assert!(untouched.exists());
        // The file being handled when Ctrl-C came in is finished and indexed.
        let index = fixture.index();
        assert_eq!(index["files"].as_array().unwrap().len(), 1);
        assert_eq!(index["files"][0]["original_name"], "A6401534.JPG");
    }

    #[rstest]
    #[case::every_file(1, Some(1))]
    #[case::batched(50, None)]
    #[tokio::test]
    async fn test_flushes_periodically(#[case] flush_every: usize, #[case] expected: Option<usize>) {
        let mut fixture = Fixture::new();
        fixture.flush_every = flush_every;
        fixture.put("A6401534.JPG");
        fixture.put("DSC00001.JPG");

        let mut session = fixture.session(false).await;
        let ctx = fixture.context();
        let inbox = crate::scan::open_inbox(fixture.inbox.path()).unwrap();
        let mut events = Box::pin(organize(&mut session, &ctx, &inbox, CancellationToken::new()));
        let mut processed = 0;
        while processed < 2 {
            if let OrganizeEvent::Processed(_) = events.next().await.unwrap().unwrap() {
                processed += 1;
            }
        }
        // Second file processed, its flush (if any) not yet reached.
        let index_path = fixture.archive.path().join("_index.json");
        let flushed = index_path.exists().then(|| fixture.index()["files"].as_array().unwrap().len());
        assert_eq!(flushed, expected);

        while events.next().await.is_some() {}
        drop(events);
        assert_eq!(fixture.index()["files"].as_array().unwrap().len(), 2);
    }
}
