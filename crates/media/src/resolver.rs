//! Capture timestamp and device resolution with fallback.
//!
//! Embedded tags win; the filesystem modification time is the last resort.
//! Timestamps are civil times (what the camera's clock said), so any offset
//! a tag carries is dropped rather than applied.

use crate::provider::{MetadataProvider, Tags};
use crate::source::SourceFile;
use derive_more::Display;
use std::sync::Arc;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::instrument;

/// Why the modification time had to stand in for the capture time.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum FallbackReason {
    #[display("no capture date in metadata")]
    Missing,
    #[display("unparsable capture date `{_0}`")]
    Unparsable(String),
    #[display("metadata unavailable: {_0}")]
    ProviderFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampSource {
    Authoritative,
    Fallback(FallbackReason),
}

/// What the archive needs to know about a file before placing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMetadata {
    /// Capture time, second precision, no zone.
    pub captured: PrimitiveDateTime,
    pub source: TimestampSource,
    pub device: String,
}
impl ResolvedMetadata {
    /// The fallback reason, if the timestamp isn't authoritative.
    pub fn fallback(&self) -> Option<&FallbackReason> {
        match &self.source {
            TimestampSource::Authoritative => None,
            TimestampSource::Fallback(reason) => Some(reason),
        }
    }
}

/// Resolves [`ResolvedMetadata`] for source files. Never fails.
#[derive(Clone)]
pub struct MetadataResolver {
    provider: Arc<dyn MetadataProvider>,
    offset: UtcOffset,
}
impl MetadataResolver {
    /// Uses the local UTC offset at construction time for modification-time
    /// fallbacks, or UTC if it can't be determined.
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        let offset = UtcOffset::current_local_offset().unwrap_or_else(|_| {
            tracing::debug!("Local UTC offset indeterminate; modification times are read as UTC");
            UtcOffset::UTC
        });
        Self { provider, offset }
    }

    pub fn with_offset(mut self, offset: UtcOffset) -> Self {
        self.offset = offset;
        self
    }

    #[instrument(skip_all, fields(file = %file.relative.display()))]
    pub async fn resolve(&self, file: &SourceFile) -> ResolvedMetadata {
        let tags = match self.provider.read_tags(&file.absolute).await {
            Ok(tags) => tags,
            Err(e) => {
                tracing::debug!(error = ?e, "Metadata provider failed");
                return self.fallback(file, &Tags::default(), FallbackReason::ProviderFailed(e.to_string()));
            },
        };
        match capture_time(&tags) {
            Ok(captured) => ResolvedMetadata {
                captured,
                source: TimestampSource::Authoritative,
                device: device_label(&tags, file),
            },
            Err(reason) => self.fallback(file, &tags, reason),
        }
    }

    fn fallback(&self, file: &SourceFile, tags: &Tags, reason: FallbackReason) -> ResolvedMetadata {
        ResolvedMetadata {
            captured: civil(file.modified, self.offset),
            source: TimestampSource::Fallback(reason),
            device: device_label(tags, file),
        }
    }
}

/// Converts an instant to civil time at `offset`, truncated to seconds.
pub fn civil(instant: OffsetDateTime, offset: UtcOffset) -> PrimitiveDateTime {
    let local = instant.to_offset(offset);
    let time = local.time().replace_nanosecond(0).unwrap_or(local.time());
    PrimitiveDateTime::new(local.date(), time)
}

fn device_label(tags: &Tags, file: &SourceFile) -> String {
    tags.model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map_or_else(|| file.device_hint.clone(), str::to_string)
}

/// `DateTimeOriginal` first, then `CreateDate`. The first present, non-zero
/// value decides: if it doesn't parse, the later tag isn't consulted.
fn capture_time(tags: &Tags) -> Result<PrimitiveDateTime, FallbackReason> {
    let candidate = [&tags.date_time_original, &tags.create_date]
        .into_iter()
        .flatten()
        .map(|v| v.trim())
        .find(|v| !v.is_empty() && !is_zero_date(v));
    match candidate {
        Some(value) => parse_tag_datetime(value).ok_or_else(|| FallbackReason::Unparsable(value.to_string())),
        None => Err(FallbackReason::Missing),
    }
}

fn is_zero_date(value: &str) -> bool {
    value.starts_with("0000")
}

/// Parses `YYYY:MM:DD HH:MM:SS` or `YYYY-MM-DD HH:MM:SS`, optionally followed
/// by sub-seconds and/or a zone designator, which are ignored.
///
/// ```
/// use lens_media::parse_tag_datetime;
/// use time::macros::datetime;
///
/// assert_eq!(parse_tag_datetime("2025:02:26 07:41:04"), Some(datetime!(2025-02-26 07:41:04)));
/// assert_eq!(parse_tag_datetime("2025:02:26 07:41:04.52+09:00"), Some(datetime!(2025-02-26 07:41:04)));
/// assert_eq!(parse_tag_datetime("2025:02:26"), None);
/// ```
pub fn parse_tag_datetime(value: &str) -> Option<PrimitiveDateTime> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if !value.is_char_boundary(19) {
        return None;
    }
    let (head, rest) = value.split_at(19);
    if !rest.is_empty() && !rest.starts_with(['.', '+', '-', 'Z', 'z']) {
        return None;
    }
    let head: String = head
        .char_indices()
        .map(|(i, c)| if (i == 4 || i == 7) && c == ':' { '-' } else { c })
        .collect();
    PrimitiveDateTime::parse(&head, format).ok()
}
