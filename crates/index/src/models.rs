use lens_media::MediaKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Partition key (`YYYY-MM-DD`) for a capture date.
pub fn date_key(date: Date) -> String {
    // Infallible: the format only uses components every `Date` has.
    date.format(format_description!("[year]-[month]-[day]")).unwrap_or_default()
}

/// One archived primary asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    /// File name as it was found in the inbox; the identity used to skip
    /// already-archived files on later runs.
    pub original_name: String,
    /// Final file name in the archive, collision suffix included.
    pub new_name: String,
    /// Location relative to the archive root, `/`-separated.
    pub path: String,
    pub thumbnail: Option<String>,
    #[serde(with = "capture_format")]
    pub datetime: PrimitiveDateTime,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub size_bytes: u64,
    pub camera: String,
}
impl ArchiveRecord {
    pub fn date_key(&self) -> String {
        date_key(self.datetime.date())
    }
}

/// The whole `_index.json` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexDocument {
    #[serde(with = "updated_format")]
    pub last_updated: Option<OffsetDateTime>,
    pub total_photos: u64,
    pub total_videos: u64,
    /// In processing order.
    pub files: Vec<ArchiveRecord>,
    /// Partition key to event label; `None` until annotated.
    pub events: BTreeMap<String, Option<String>>,
}
impl IndexDocument {
    pub fn count(&self, kind: MediaKind) -> u64 {
        self.files.iter().filter(|r| r.kind == kind).count() as u64
    }

    pub fn label(&self, date: &str) -> Option<&str> {
        self.events.get(date).and_then(Option::as_deref)
    }

    /// Restore the document invariants (totals match the records, every
    /// record's date is in `events`). Returns `true` if anything changed.
    pub fn reconcile(&mut self) -> bool {
        let mut changed = false;
        let (photos, videos) = (self.count(MediaKind::Photo), self.count(MediaKind::Video));
        if (self.total_photos, self.total_videos) != (photos, videos) {
            self.total_photos = photos;
            self.total_videos = videos;
            changed = true;
        }
        for record in &self.files {
            if !self.events.contains_key(&record.date_key()) {
                self.events.insert(record.date_key(), None);
                changed = true;
            }
        }
        changed
    }
}

/// Parse an ISO 8601 date-time with optional sub-seconds and an optional
/// zone designator. Older indexes were written with both.
fn parse_iso(text: &str) -> Option<(PrimitiveDateTime, Option<UtcOffset>)> {
    if let Ok(instant) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some((PrimitiveDateTime::new(instant.date(), instant.time()), Some(instant.offset())));
    }
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");
    PrimitiveDateTime::parse(text, format).ok().map(|civil| (civil, None))
}

/// Capture times are written as `YYYY-MM-DDTHH:MM:SS`. Reading also accepts
/// sub-seconds (dropped) and a zone designator (ignored: capture times are
/// civil).
mod capture_format {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::PrimitiveDateTime;
    use time::macros::format_description;

    pub fn serialize<S: Serializer>(value: &PrimitiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        let text = value
            .format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PrimitiveDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        let (civil, _) = super::parse_iso(&text).ok_or_else(|| D::Error::custom(format!("invalid date-time `{text}`")))?;
        Ok(civil.replace_nanosecond(0).unwrap_or(civil))
    }
}

/// Written as RFC 3339. A value without an offset is read as local time.
mod updated_format {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::{OffsetDateTime, UtcOffset};

    pub fn serialize<S: Serializer>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error> {
        time::serde::rfc3339::option::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error> {
        let Some(text) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let (civil, offset) =
            super::parse_iso(&text).ok_or_else(|| D::Error::custom(format!("invalid date-time `{text}`")))?;
        let offset = offset.unwrap_or_else(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC));
        Ok(Some(civil.assume_offset(offset)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use time::macros::{date, datetime};

    pub(crate) fn record(name: &str, kind: MediaKind, at: PrimitiveDateTime) -> ArchiveRecord {
        let key = date_key(at.date());
        let dir = format!("{}/{:02}/{key}/{}", at.year(), at.month() as u8, kind.directory());
        let new_name = format!("{}_{name}", at.format(format_description!("[year][month][day]_[hour][minute][second]")).unwrap());
        ArchiveRecord {
            original_name: name.to_string(),
            path: format!("{dir}/{new_name}"),
            new_name,
            thumbnail: None,
            datetime: at,
            kind,
            size_bytes: 10,
            camera: "ILCE-6400".to_string(),
        }
    }

    #[test]
    fn test_date_key() {
        assert_eq!(date_key(date!(2025 - 02 - 26)), "2025-02-26");
    }

    #[test]
    fn test_record_wire_format() {
        let record = record("A6401534.JPG", MediaKind::Photo, datetime!(2025-02-26 07:41:04));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["datetime"], "2025-02-26T07:41:04");
        assert_eq!(json["type"], "photo");
        assert_eq!(json["path"], "2025/02/2025-02-26/photos/20250226_074104_A6401534.JPG");
        assert!(json["thumbnail"].is_null());
    }

    #[test]
    fn test_empty_document_wire_format() {
        let json = serde_json::to_value(IndexDocument::default()).unwrap();
        assert!(json["last_updated"].is_null());
        assert_eq!(json["total_photos"], 0);
        assert_eq!(json["files"], serde_json::json!([]));
        assert_eq!(json["events"], serde_json::json!({}));
    }

    #[test]
    fn test_reads_document_written_by_earlier_versions() {
        let json = r#"{
            "last_updated": "2025-02-27T21:04:11.123456+08:00",
            "total_photos": 1,
            "total_videos": 0,
            "files": [{
                "original_name": "DSC00001.JPG",
                "new_name": "20241227_101500_DSC00001.JPG",
                "path": "2024/12/2024-12-27_Kyoto/photos/20241227_101500_DSC00001.JPG",
                "thumbnail": "2024/12/2024-12-27_Kyoto/thumbnails/20241227_101500_DSC00001_thumb.JPG",
                "datetime": "2024-12-27T10:15:00",
                "type": "photo",
                "size_bytes": 5242880,
                "camera": "ILCE-6400"
            }],
            "events": {"2024-12-27": "Kyoto"}
        }"#;
        let doc: IndexDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.files[0].datetime, datetime!(2024-12-27 10:15:00));
        assert_eq!(doc.label("2024-12-27"), Some("Kyoto"));
        assert!(doc.last_updated.is_some());
    }

    #[test]
    fn test_reads_naive_timestamps_with_fractions() {
        let json = r#"{
            "last_updated": "2025-02-27T21:04:11.123456",
            "total_photos": 1,
            "total_videos": 0,
            "files": [{
                "original_name": "DSC09999.JPG",
                "new_name": "20241227_020000_DSC09999.JPG",
                "path": "2024/12/2024-12-27/photos/20241227_020000_DSC09999.JPG",
                "thumbnail": null,
                "datetime": "2024-12-27T02:00:00.750000",
                "type": "photo",
                "size_bytes": 2048,
                "camera": "Unknown"
            }],
            "events": {"2024-12-27": null}
        }"#;
        let doc: IndexDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.files[0].datetime, datetime!(2024-12-27 02:00:00));
        let updated = doc.last_updated.unwrap();
        assert_eq!((updated.hour(), updated.minute(), updated.second()), (21, 4, 11));
        assert_eq!(updated.microsecond(), 123_456);

        // Written back in the canonical form.
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["files"][0]["datetime"], "2024-12-27T02:00:00");
        assert!(OffsetDateTime::parse(json["last_updated"].as_str().unwrap(), &Rfc3339).is_ok());
    }

    #[rstest::rstest]
    #[case("2024-12-27T10:15")]
    #[case("27/12/2024 10:15:00")]
    #[case("")]
    fn test_rejects_malformed_capture_time(#[case] value: &str) {
        let json = serde_json::json!({
            "original_name": "A.JPG",
            "new_name": "A.JPG",
            "path": "A.JPG",
            "thumbnail": null,
            "datetime": value,
            "type": "photo",
            "size_bytes": 1,
            "camera": "Unknown"
        });
        assert!(serde_json::from_value::<ArchiveRecord>(json).is_err());
    }

    #[test]
    fn test_reconcile() {
        let mut doc = IndexDocument {
            total_photos: 7,
            files: vec![
                record("A.JPG", MediaKind::Photo, datetime!(2025-02-26 07:41:04)),
                record("C0001.MP4", MediaKind::Video, datetime!(2025-02-27 08:00:00)),
            ],
            ..Default::default()
        };
        doc.events.insert("2025-02-26".into(), Some("Tokyo".into()));
        assert!(doc.reconcile());
        assert_eq!((doc.total_photos, doc.total_videos), (1, 1));
        assert_eq!(doc.events.get("2025-02-27"), Some(&None));
        assert_eq!(doc.label("2025-02-26"), Some("Tokyo"));
        assert!(!doc.reconcile());
    }
}
