use crate::kind::{Classification, DiscardReason};
use crate::profile::{DeviceFilter, split_name};
use std::ffi::OsStr;
use std::path::PathBuf;
use time::OffsetDateTime;

/// One file discovered in the inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Location relative to the inbox root; also the processing sort key.
    pub relative: PathBuf,
    /// Location on the local filesystem, handed to external tools.
    pub absolute: PathBuf,
    pub size: u64,
    pub modified: OffsetDateTime,
    pub classification: Classification,
    /// Family of the device profile that recognised the name.
    pub device_hint: String,
}
impl SourceFile {
    /// Describe a discovered file, classifying it with `filter`.
    ///
    /// Names that aren't valid UTF-8 are discarded: they could be neither
    /// matched against the index nor recorded in it faithfully.
    pub fn inspect(
        filter: &DeviceFilter,
        relative: impl Into<PathBuf>,
        absolute: impl Into<PathBuf>,
        size: u64,
        modified: OffsetDateTime,
    ) -> Self {
        let relative = relative.into();
        let name = relative.file_name().and_then(OsStr::to_str);
        let classification = match name {
            Some(name) => filter.classify(name),
            None => Classification::Discard(DiscardReason::UnreadableName),
        };
        Self {
            classification,
            device_hint: filter.profile_for(name.unwrap_or_default()).family().to_string(),
            absolute: absolute.into(),
            relative,
            size,
            modified,
        }
    }

    /// Original file name, verbatim. Empty for names that aren't UTF-8,
    /// which never get past classification.
    pub fn name(&self) -> String {
        self.relative.file_name().and_then(OsStr::to_str).unwrap_or_default().to_string()
    }

    /// Original stem and extension, verbatim.
    pub fn stem_and_extension(&self) -> (String, Option<String>) {
        let name = self.name();
        let (stem, ext) = split_name(&name);
        (stem.to_string(), ext.map(str::to_string))
    }
}
