use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// The two kinds of primary asset that get archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}
impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }

    /// Name of the partition subdirectory files of this kind are placed in.
    pub fn directory(&self) -> &'static str {
        match self {
            Self::Photo => "photos",
            Self::Video => "videos",
        }
    }
}
impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Why a file is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum DiscardReason {
    /// Device preview or cache file (low-resolution proxies, thumbnails).
    #[display("device auxiliary file")]
    Auxiliary,
    /// macOS resource fork (`._` prefix).
    #[display("AppleDouble resource fork")]
    AppleDouble,
    #[display("unsupported file type")]
    Unsupported,
    /// The name isn't valid UTF-8, so it can't be recorded as it is.
    #[display("file name is not valid UTF-8")]
    UnreadableName,
}

/// What the engine should do with a file, derived from its name alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Primary(MediaKind),
    /// Camera-generated metadata belonging to the video whose stem is
    /// `primary_stem`.
    Sidecar {
        primary_stem: String,
    },
    Discard(DiscardReason),
}
impl Classification {
    pub fn kind(&self) -> Option<MediaKind> {
        match self {
            Self::Primary(kind) => Some(*kind),
            _ => None,
        }
    }
}
