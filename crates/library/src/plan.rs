//! Destination planning.
//!
//! The layout of the archive is fixed:
//!
//! ```text
//! {YYYY}/{MM}/{YYYY-MM-DD}[_{Label}]/photos/{stem}.{ext}
//! {YYYY}/{MM}/{YYYY-MM-DD}[_{Label}]/videos/{stem}.{ext}
//! {YYYY}/{MM}/{YYYY-MM-DD}[_{Label}]/thumbnails/{stem}_thumb.{ext}
//! ```
//!
//! Only the stem is configurable (see [`NameTemplate`]). When the name is
//! taken, on disk or earlier in the same run, `_1`, `_2`, ... is appended to
//! the stem until a free name is found.

use crate::error::{ErrorKind, Result};
use crate::template::{NameParts, NameTemplate};
use exn::ResultExt;
use lens_index::date_key;
use lens_media::{MediaKind, ResolvedMetadata, SourceFile, split_name};
use lens_storage::StorageBackend;
use std::collections::HashSet;
use std::path::Path;
use time::Date;
use tracing::instrument;

/// Highest collision suffix tried before giving up on a name.
pub const MAX_SUFFIX: u32 = 9999;

/// Archive paths handed out during the current run. In a dry run nothing
/// lands on disk, so these are the only record of names already taken.
#[derive(Debug, Default)]
pub struct Claims(HashSet<String>);
impl Claims {
    pub fn is_claimed(&self, path: &str) -> bool {
        self.0.contains(path)
    }

    /// Claim every archive path a plan occupies.
    pub fn claim(&mut self, plan: &Plan) {
        self.0.insert(plan.path.clone());
        if let Some(sidecar) = &plan.sidecar {
            self.0.insert(sidecar.clone());
        }
    }
}

/// Where one primary asset (and its sidecar) will be placed. All paths are
/// relative to the archive root and `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub kind: MediaKind,
    /// Partition key, `YYYY-MM-DD`.
    pub date: String,
    /// Partition directory, `YYYY/MM/YYYY-MM-DD[_Label]`.
    pub partition: String,
    /// Final stem, collision suffix included.
    pub stem: String,
    /// Final file name.
    pub file_name: String,
    pub path: String,
    /// Photos only.
    pub thumbnail: Option<String>,
    pub sidecar: Option<String>,
    /// Collision suffix, if the rendered name was taken.
    pub suffix: Option<u32>,
}

pub struct PathPlanner {
    template: NameTemplate,
}
impl Default for PathPlanner {
    fn default() -> Self {
        Self::new(NameTemplate::default())
    }
}
impl PathPlanner {
    pub fn new(template: NameTemplate) -> Self {
        Self { template }
    }

    /// Partition directory for a capture date, with the event label when the
    /// date has one.
    ///
    /// ```
    /// use lens_library::PathPlanner;
    /// use time::macros::date;
    ///
    /// assert_eq!(PathPlanner::partition(date!(2024 - 12 - 27), None), "2024/12/2024-12-27");
    /// assert_eq!(PathPlanner::partition(date!(2024 - 12 - 27), Some("Kyoto")), "2024/12/2024-12-27_Kyoto");
    /// ```
    pub fn partition(date: Date, label: Option<&str>) -> String {
        let key = date_key(date);
        let directory = match label {
            Some(label) => format!("{key}_{label}"),
            None => key,
        };
        format!("{:04}/{:02}/{directory}", date.year(), date.month() as u8)
    }

    /// Plan the destination for `file` (and the `sidecar` travelling with it).
    ///
    /// A name is free when neither it nor the sidecar's derived name exists in
    /// `backend` or in `claims`. Planning doesn't claim anything; that is up to
    /// the caller once the file has actually been placed.
    #[instrument(skip_all, fields(file = %file.relative.display()))]
    pub async fn plan(
        &self,
        file: &SourceFile,
        metadata: &ResolvedMetadata,
        sidecar: Option<&SourceFile>,
        label: Option<&str>,
        claims: &Claims,
        backend: &dyn StorageBackend,
    ) -> Result<Plan> {
        let Some(kind) = file.classification.kind() else {
            exn::bail!(ErrorKind::Template);
        };
        let (original_stem, extension) = file.stem_and_extension();
        let base = self.template.render(&NameParts {
            captured: metadata.captured,
            stem: &original_stem,
            device: &metadata.device,
            kind,
        })?;
        let partition = Self::partition(metadata.captured.date(), label);
        let directory = format!("{partition}/{}", kind.directory());
        let sidecar = sidecar.map(|s| sidecar_parts(s, &original_stem));

        for suffix in std::iter::once(None).chain((1..=MAX_SUFFIX).map(Some)) {
            let stem = match suffix {
                Some(n) => format!("{base}_{n}"),
                None => base.clone(),
            };
            let file_name = join_extension(&stem, extension.as_deref());
            let path = format!("{directory}/{file_name}");
            let sidecar_path = sidecar
                .as_ref()
                .map(|(rest, ext)| format!("{directory}/{}", join_extension(&format!("{stem}{rest}"), ext.as_deref())));
            if !is_free(&path, claims, backend).await? {
                continue;
            }
            if let Some(sidecar_path) = &sidecar_path
                && !is_free(sidecar_path, claims, backend).await?
            {
                continue;
            }
            if let Some(n) = suffix {
                tracing::debug!(name = %join_extension(&base, extension.as_deref()), suffix = n, "Name taken; suffixed");
            }
            let thumbnail = (kind == MediaKind::Photo)
                .then(|| format!("{partition}/thumbnails/{}", join_extension(&format!("{stem}_thumb"), extension.as_deref())));
            return Ok(Plan {
                kind,
                date: date_key(metadata.captured.date()),
                partition,
                stem,
                file_name,
                path,
                thumbnail,
                sidecar: sidecar_path,
                suffix,
            });
        }
        exn::bail!(ErrorKind::Collision(join_extension(&base, extension.as_deref())))
    }
}

async fn is_free(path: &str, claims: &Claims, backend: &dyn StorageBackend) -> Result<bool> {
    if claims.is_claimed(path) {
        return Ok(false);
    }
    let exists = backend.exists(Path::new(path)).await.or_raise(|| ErrorKind::Storage)?;
    Ok(!exists)
}

fn join_extension(stem: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

/// Whatever follows the primary's stem in the sidecar's name (`M01` for
/// `C0001M01.XML` next to `C0001.MP4`), and the sidecar's extension.
fn sidecar_parts(sidecar: &SourceFile, primary_stem: &str) -> (String, Option<String>) {
    let name = sidecar.name();
    let (stem, extension) = split_name(&name);
    let rest = match stem.get(..primary_stem.len()) {
        Some(head) if head.eq_ignore_ascii_case(primary_stem) => &stem[primary_stem.len()..],
        _ => "",
    };
    (rest.to_string(), extension.map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_media::{DeviceFilter, TimestampSource};
    use lens_storage::backend::MockBackend;
    use time::OffsetDateTime;
    use time::macros::{date, datetime};

    fn source(name: &str) -> SourceFile {
        SourceFile::inspect(&DeviceFilter::default(), name, format!("/inbox/{name}"), 10, OffsetDateTime::UNIX_EPOCH)
    }

    fn metadata(at: time::PrimitiveDateTime) -> ResolvedMetadata {
        ResolvedMetadata { captured: at, source: TimestampSource::Authoritative, device: "ILCE-6400".into() }
    }

    #[tokio::test]
    async fn test_plans_photo() {
        let plan = PathPlanner::default()
            .plan(
                &source("A6401534.JPG"),
                &metadata(datetime!(2025-02-26 07:41:04)),
                None,
                None,
                &Claims::default(),
                &MockBackend::default(),
            )
            .await
            .unwrap();
        assert_eq!(plan.path, "2025/02/2025-02-26/photos/20250226_074104_A6401534.JPG");
        assert_eq!(plan.thumbnail.as_deref(), Some("2025/02/2025-02-26/thumbnails/20250226_074104_A6401534_thumb.JPG"));
        assert_eq!(plan.date, "2025-02-26");
        assert_eq!(plan.suffix, None);
    }

    #[tokio::test]
    async fn test_plans_labeled_video_with_sidecar() {
        let plan = PathPlanner::default()
            .plan(
                &source("C0001.MP4"),
                &metadata(datetime!(2024-12-27 10:15:00)),
                Some(&source("C0001M01.XML")),
                Some("Kyoto"),
                &Claims::default(),
                &MockBackend::default(),
            )
            .await
            .unwrap();
        assert_eq!(plan.path, "2024/12/2024-12-27_Kyoto/videos/20241227_101500_C0001.MP4");
        assert_eq!(plan.sidecar.as_deref(), Some("2024/12/2024-12-27_Kyoto/videos/20241227_101500_C0001M01.XML"));
        assert_eq!(plan.thumbnail, None);
    }

    #[tokio::test]
    async fn test_collision_on_disk_and_in_run() {
        let planner = PathPlanner::default();
        let backend = MockBackend::with_files([("2025/02/2025-02-26/photos/20250226_074104_DSC00001.JPG", b"x".to_vec())]);
        let at = metadata(datetime!(2025-02-26 07:41:04));
        let mut claims = Claims::default();

        let first = planner.plan(&source("DSC00001.JPG"), &at, None, None, &claims, &backend).await.unwrap();
        assert_eq!(first.file_name, "20250226_074104_DSC00001_1.JPG");
        assert_eq!(first.suffix, Some(1));
        claims.claim(&first);

        let second = planner.plan(&source("DSC00001.JPG"), &at, None, None, &claims, &backend).await.unwrap();
        assert_eq!(second.file_name, "20250226_074104_DSC00001_2.JPG");
        assert_eq!(second.thumbnail.as_deref(), Some("2025/02/2025-02-26/thumbnails/20250226_074104_DSC00001_2_thumb.JPG"));
    }

    #[tokio::test]
    async fn test_sidecar_name_counts_towards_collision() {
        let backend = MockBackend::with_files([("2024/12/2024-12-27/videos/20241227_101500_C0001M01.XML", b"x".to_vec())]);
        let plan = PathPlanner::default()
            .plan(
                &source("C0001.MP4"),
                &metadata(datetime!(2024-12-27 10:15:00)),
                Some(&source("C0001M01.XML")),
                None,
                &Claims::default(),
                &backend,
            )
            .await
            .unwrap();
        assert_eq!(plan.file_name, "20241227_101500_C0001_1.MP4");
        assert_eq!(plan.sidecar.as_deref(), Some("2024/12/2024-12-27/videos/20241227_101500_C0001_1M01.XML"));
    }

    #[tokio::test]
    async fn test_collision_exhaustion() {
        let planner = PathPlanner::new("fixed".parse().unwrap());
        let at = metadata(datetime!(2025-02-26 07:41:04));
        let mut claims = Claims::default();
        claims.0.insert("2025/02/2025-02-26/photos/fixed.JPG".into());
        for n in 1..=MAX_SUFFIX {
            claims.0.insert(format!("2025/02/2025-02-26/photos/fixed_{n}.JPG"));
        }
        let err = planner.plan(&source("A.JPG"), &at, None, None, &claims, &MockBackend::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Collision(name) if name == "fixed.JPG"));
    }

    #[tokio::test]
    async fn test_refuses_non_primary() {
        let err = PathPlanner::default()
            .plan(
                &source("notes.txt"),
                &metadata(datetime!(2025-02-26 07:41:04)),
                None,
                None,
                &Claims::default(),
                &MockBackend::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::Template));
    }

    #[test]
    fn test_partition() {
        assert_eq!(PathPlanner::partition(date!(2025 - 02 - 26), None), "2025/02/2025-02-26");
        assert_eq!(PathPlanner::partition(date!(2025 - 02 - 26), Some("京都旅行")), "2025/02/2025-02-26_京都旅行");
    }

    #[test]
    fn test_sidecar_parts() {
        assert_eq!(sidecar_parts(&source("C0001M01.XML"), "C0001"), ("M01".to_string(), Some("XML".to_string())));
        assert_eq!(sidecar_parts(&source("GX010001.srt"), "GX010001"), (String::new(), Some("srt".to_string())));
    }
}
