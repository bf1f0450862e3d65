//! File name templating.
//!
//! Archive file stems are rendered from a user-configured [upon] template. The
//! syntax follows upon's Mustache-like conventions (`{{ variable }}`,
//! `{{ value|formatter }}`), extended with two helpers:
//!
//! - **`slug`**: converts strings to URL-safe slugs, stripping quotation marks
//!   first to avoid artifacts like leading/trailing hyphens.
//! - **`truncate`**: truncates strings to a maximum byte length at a character
//!   boundary, usable as either `truncate(value, n)` or `{{ value|truncate: n }}`.
//!
//! # Template Variables
//!
//! | Variable | Description                                       |
//! |----------|---------------------------------------------------|
//! | `date`   | Capture date, `YYYYMMDD`                          |
//! | `time`   | Capture time, `HHMMSS`                            |
//! | `stem`   | Original file name without extension, verbatim    |
//! | `device` | Device label (`Model` tag or device family)       |
//! | `kind`   | `photo` or `video`                                |
//!
//! The original extension is always appended after rendering, so templates
//! only ever produce the stem.
//!
//! # Example
//!
//! ```
//! use lens_library::{NameParts, NameTemplate};
//! use lens_media::MediaKind;
//! use time::macros::datetime;
//!
//! let template: NameTemplate = "{{ date }}-{{ device|slug }}-{{ stem }}".parse().unwrap();
//! let parts = NameParts {
//!     captured: datetime!(2025-02-26 07:41:04),
//!     stem: "A6401534",
//!     device: "ILCE-6400",
//!     kind: MediaKind::Photo,
//! };
//! assert_eq!(template.render(&parts).unwrap(), "20250226-ilce-6400-A6401534");
//! ```

use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use lens_media::MediaKind;
use lens_storage::validate_segment;
use std::str::FromStr;
use time::PrimitiveDateTime;
use time::macros::format_description;
use tracing::instrument;
use upon::{Engine, Template};

/// Everything a template may refer to.
#[derive(Debug, Clone, Copy)]
pub struct NameParts<'a> {
    pub captured: PrimitiveDateTime,
    pub stem: &'a str,
    pub device: &'a str,
    pub kind: MediaKind,
}

/// Compiled file name template.
///
/// Constructed via [`FromStr`], which compiles the template eagerly so that
/// syntax errors surface when the configuration is loaded rather than halfway
/// through a run. Whitespace around the template itself is ignored.
pub struct NameTemplate {
    engine: Engine<'static>,
    template: Template<'static>,
}
impl FromStr for NameTemplate {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let template = engine.compile(s.trim().to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template })
    }
}
impl Default for NameTemplate {
    fn default() -> Self {
        // Infallible: the default template is a constant known to compile.
        lens_config::DEFAULT_NAMING_TEMPLATE.parse().unwrap()
    }
}
impl NameTemplate {
    /// Render the stem for one file. The result is a single path segment,
    /// non-empty and free of separators, kept exactly as rendered.
    #[instrument(level = "trace", skip_all, fields(stem = parts.stem))]
    pub fn render(&self, parts: &NameParts<'_>) -> Result<String> {
        let rendered = self
            .template
            .render(&self.engine, Self::parameters(parts)?)
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        validate_segment(&rendered).or_raise(|| ErrorKind::Template)?;
        Ok(rendered)
    }

    fn parameters(parts: &NameParts<'_>) -> Result<upon::Value> {
        let date = parts
            .captured
            .format(format_description!("[year][month][day]"))
            .or_raise(|| ErrorKind::Template)?;
        let time = parts
            .captured
            .format(format_description!("[hour][minute][second]"))
            .or_raise(|| ErrorKind::Template)?;
        Ok(upon::value! {
            date: date,
            time: time,
            stem: parts.stem,
            device: parts.device,
            kind: parts.kind.as_str(),
        })
    }
}

/// Custom [`upon`] extensions for path-safe string manipulation.
mod addons {
    use rslug::slugify;
    use std::fmt::Write;
    use upon::{Engine, Value, fmt as upon_fmt};

    /// Converts strings to URL-safe slugs, dropping quotation marks first so
    /// `"Kyoto"` doesn't become `-kyoto-`.
    fn slug_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => {
                let marks = [
                    '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}',
                    '\u{0060}', '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
                ];
                let stripped: String = s.chars().filter(|c| !marks.contains(c)).collect();
                write!(f, "{}", slugify!(&stripped))?
            },
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> String {
        s[..s.floor_char_boundary(max_bytes)].to_string()
    }

    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("slug", slug_formatter);
        engine.add_function("truncate", truncate_to_char_boundary);
    }
}
