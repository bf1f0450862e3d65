//! Device profiles and the filter that classifies inbox files.
//!
//! Everything in here works on the file name alone: no I/O, no metadata.
//! Camera makers each have their own naming habits and their own litter of
//! proxy files, so the rules are kept in a registry of [`DeviceProfile`]s
//! rather than one big match.

use crate::kind::{Classification, DiscardReason, MediaKind};
use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Sony: DSC00001.JPG, _DSC0001.JPG, A6401534.JPG (a6400 style), C0001.MP4 and
// the C0001M01.XML clip metadata next to it.
regex!(SONY_STEM, r"(?i)^(_?DSC\d{4,5}|A\d{7}|C\d{4}(M\d{2})?)$");
regex!(SONY_SIDECAR, r"(?i)^(C\d{4})M\d{2}$");
// GoPro: GOPR0001, GP010001 (chaptered), GH/GX/GL010001 (HERO6+), G0010001 (time lapse).
regex!(GOPRO_STEM, r"(?i)^(GOPR\d{4}|GP\d{6}|G[HXL]\d{6}|G\d{7})$");
// DJI: DJI_0001, DJI_20240101123456_0001_D.
regex!(DJI_STEM, r"(?i)^DJI_\d+");

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov"];
const SIDECAR_EXTENSIONS: &[&str] = &["xml", "srt"];

/// Naming rules for one family of devices.
///
/// Profiles are consulted in registration order; the first one whose
/// [`matches`](Self::matches) accepts a file stem owns it.
pub trait DeviceProfile: Send + Sync {
    /// Human-readable device family, used as the device label when the file
    /// carries no `Model` tag.
    fn family(&self) -> &str;

    /// Whether a file stem (name without extension) looks like it came from
    /// this device.
    fn matches(&self, stem: &str) -> bool;

    /// Lower-case extensions of preview/cache files this device writes
    /// alongside the real media.
    fn auxiliary_extensions(&self) -> &[&str] {
        &[]
    }

    /// Stem of the primary a sidecar named `stem` belongs to, when the device
    /// decorates sidecar names. `None` means the sidecar shares the stem.
    fn sidecar_primary_stem<'a>(&self, _stem: &'a str) -> Option<&'a str> {
        None
    }
}

pub struct Sony;
impl DeviceProfile for Sony {
    fn family(&self) -> &str {
        "Sony"
    }

    fn matches(&self, stem: &str) -> bool {
        SONY_STEM.is_match(stem)
    }

    fn sidecar_primary_stem<'a>(&self, stem: &'a str) -> Option<&'a str> {
        SONY_SIDECAR.captures(stem).and_then(|c| c.get(1)).map(|m| m.as_str())
    }
}

pub struct GoPro;
impl DeviceProfile for GoPro {
    fn family(&self) -> &str {
        "GoPro"
    }

    fn matches(&self, stem: &str) -> bool {
        GOPRO_STEM.is_match(stem)
    }

    fn auxiliary_extensions(&self) -> &[&str] {
        &["lrv", "thm"]
    }
}

pub struct Dji;
impl DeviceProfile for Dji {
    fn family(&self) -> &str {
        "DJI"
    }

    fn matches(&self, stem: &str) -> bool {
        DJI_STEM.is_match(stem)
    }

    fn auxiliary_extensions(&self) -> &[&str] {
        &["lrf"]
    }
}

/// Catch-all for files no registered profile recognises.
pub struct Generic;
impl DeviceProfile for Generic {
    fn family(&self) -> &str {
        "Unknown"
    }

    fn matches(&self, _stem: &str) -> bool {
        true
    }
}

/// Splits a file name into stem and extension at the last dot. Names without
/// a dot (or with nothing before it) have no extension.
pub fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

/// Registry of device profiles deciding what each inbox file is.
///
/// # Example
///
/// ```
/// use lens_media::{Classification, DeviceFilter, MediaKind};
///
/// let filter = DeviceFilter::default();
/// assert_eq!(filter.classify("A6401534.JPG"), Classification::Primary(MediaKind::Photo));
/// assert_eq!(
///     filter.classify("C0001M01.XML"),
///     Classification::Sidecar { primary_stem: "C0001".to_string() },
/// );
/// ```
pub struct DeviceFilter {
    profiles: Vec<Box<dyn DeviceProfile>>,
    fallback: Generic,
}
impl Default for DeviceFilter {
    fn default() -> Self {
        Self::empty().with_profile(Sony).with_profile(GoPro).with_profile(Dji)
    }
}
impl DeviceFilter {
    /// A filter with no device profiles registered; everything falls through
    /// to the generic profile.
    pub fn empty() -> Self {
        Self { profiles: Vec::new(), fallback: Generic }
    }

    /// Register another profile, consulted after those already registered.
    pub fn with_profile(mut self, profile: impl DeviceProfile + 'static) -> Self {
        self.profiles.push(Box::new(profile));
        self
    }

    /// The profile owning a file name, falling back to the generic profile.
    pub fn profile_for(&self, name: &str) -> &dyn DeviceProfile {
        let (stem, _) = split_name(name);
        self.profiles.iter().map(Box::as_ref).find(|p| p.matches(stem)).unwrap_or(&self.fallback)
    }

    /// Classify a file by name. Pure and total: every name gets an answer.
    pub fn classify(&self, name: &str) -> Classification {
        if name.starts_with("._") {
            return Classification::Discard(DiscardReason::AppleDouble);
        }
        let (stem, Some(ext)) = split_name(name) else {
            return Classification::Discard(DiscardReason::Unsupported);
        };
        let ext = ext.to_ascii_lowercase();
        if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
            return Classification::Primary(MediaKind::Photo);
        }
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            return Classification::Primary(MediaKind::Video);
        }
        if SIDECAR_EXTENSIONS.contains(&ext.as_str()) {
            let primary_stem = self.profile_for(name).sidecar_primary_stem(stem).unwrap_or(stem);
            return Classification::Sidecar { primary_stem: primary_stem.to_string() };
        }
        // Proxy files are named after the device's usual pattern, but with
        // some devices (GoPro LRV: GL010001) the stem alone isn't a reliable
        // owner; any registered profile's denylist applies.
        if self.profiles.iter().any(|p| p.auxiliary_extensions().contains(&ext.as_str())) {
            return Classification::Discard(DiscardReason::Auxiliary);
        }
        Classification::Discard(DiscardReason::Unsupported)
    }
}
