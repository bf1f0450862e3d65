//! Per-file outcomes and the aggregate run report.

use derive_more::Display;
use lens_index::ArchiveRecord;
use lens_media::{DiscardReason, FallbackReason, MediaKind};
use std::collections::BTreeMap;
use std::fmt::{Display as FmtDisplay, Formatter, Result as FmtResult};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum Severity {
    #[display("DEBUG")]
    Debug,
    #[display("WARNING")]
    Warning,
    #[display("ERROR")]
    Error,
}

/// Something worth telling the user about a single file (or partition). None
/// of these stop the run.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Issue {
    #[display("{_0}; using file modification time")]
    MetadataUnavailable(FallbackReason),
    #[display("move failed: {_0}")]
    MoveFailed(String),
    #[display("thumbnail failed: {_0}")]
    ThumbnailFailed(String),
    #[display("no sidecar found; video moved alone")]
    SidecarMissing,
    #[display("name taken; archived with suffix _{_0}")]
    NameCollision(u32),
    #[display("sidecar has no matching video in this scan; left in place")]
    OrphanSidecar,
    #[display("event annotation failed: {_0}")]
    AnnotationFailed(String),
}
impl Issue {
    pub fn severity(&self) -> Severity {
        match self {
            Self::MoveFailed(_) | Self::AnnotationFailed(_) => Severity::Error,
            Self::NameCollision(_) => Severity::Debug,
            Self::MetadataUnavailable(_) | Self::ThumbnailFailed(_) | Self::SidecarMissing | Self::OrphanSidecar => {
                Severity::Warning
            },
        }
    }
}

/// What happened to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Placed in the archive (or would have been, in a dry run).
    Archived(Box<ArchiveRecord>),
    /// An earlier run archived a file with this name; left in the inbox.
    AlreadyArchived,
    /// Never moved or indexed.
    Discarded(DiscardReason),
    /// Not handled on its own (orphan sidecars); left in the inbox.
    LeftInPlace,
    /// Could not be placed; left in the inbox.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    /// Location relative to the inbox.
    pub source: PathBuf,
    pub disposition: Disposition,
    pub issues: Vec<Issue>,
}
impl FileOutcome {
    pub fn new(source: impl Into<PathBuf>, disposition: Disposition) -> Self {
        Self { source: source.into(), disposition, issues: Vec::new() }
    }

    pub fn with_issue(mut self, issue: Issue) -> Self {
        self.issues.push(issue);
        self
    }

    pub fn record(&self) -> Option<&ArchiveRecord> {
        match &self.disposition {
            Disposition::Archived(record) => Some(record.as_ref()),
            _ => None,
        }
    }
}

/// Photos and videos archived on one date during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayCount {
    pub photos: u64,
    pub videos: u64,
}
impl FmtDisplay for DayCount {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let parts: Vec<String> = [(self.photos, "photo"), (self.videos, "video")]
            .into_iter()
            .filter(|(n, _)| *n > 0)
            .map(|(n, noun)| format!("{n} {noun}{}", if n == 1 { "" } else { "s" }))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub photos: u64,
    pub videos: u64,
    pub already_archived: u64,
    pub discarded: u64,
    pub failed: u64,
    pub warnings: u64,
    pub errors: u64,
    /// Partitions that received files this run, by date key.
    pub touched: BTreeMap<String, DayCount>,
    pub dry_run: bool,
    pub cancelled: bool,
    /// Where the run log went, for the closing line of the report.
    pub log_file: Option<PathBuf>,
}
impl RunReport {
    /// Fold a file's outcome into the totals.
    pub fn add(&mut self, outcome: &FileOutcome) {
        match &outcome.disposition {
            Disposition::Archived(record) => {
                let day = self.touched.entry(record.date_key()).or_default();
                match record.kind {
                    MediaKind::Photo => {
                        self.photos += 1;
                        day.photos += 1;
                    },
                    MediaKind::Video => {
                        self.videos += 1;
                        day.videos += 1;
                    },
                }
            },
            Disposition::AlreadyArchived => self.already_archived += 1,
            Disposition::Discarded(_) => self.discarded += 1,
            Disposition::Failed => self.failed += 1,
            Disposition::LeftInPlace => {},
        }
        self.count_issues(&outcome.issues);
    }

    /// Count issues raised outside of a file outcome (annotation).
    pub fn count_issues<'a>(&mut self, issues: impl IntoIterator<Item = &'a Issue>) {
        for issue in issues {
            match issue.severity() {
                Severity::Warning => self.warnings += 1,
                Severity::Error => self.errors += 1,
                Severity::Debug => {},
            }
        }
    }
}
impl FmtDisplay for RunReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let title = match (self.dry_run, self.cancelled) {
            (_, true) => "Run cancelled",
            (true, false) => "Dry run complete",
            (false, false) => "Run complete",
        };
        writeln!(f, "╔════════════════════════════════════════╗")?;
        writeln!(f, "║  {title:<38}║")?;
        writeln!(f, "╠════════════════════════════════════════╣")?;
        for (label, value) in [
            ("Photos", self.photos),
            ("Videos", self.videos),
            ("Already archived", self.already_archived),
            ("Skipped", self.discarded),
            ("Warnings", self.warnings),
            ("Errors", self.errors),
        ] {
            writeln!(f, "║  {label:<18}{value:>8}            ║")?;
        }
        write!(f, "╚════════════════════════════════════════╝")?;
        if let Some(log) = &self.log_file {
            write!(f, "\nDetailed log: {}", log.display())?;
        }
        Ok(())
    }
}
