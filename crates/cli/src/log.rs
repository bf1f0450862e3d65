//! The run log.
//!
//! Every run appends to the log file in the archive root, one line per event:
//!
//! ```text
//! 2025-02-26 07:41:04 [WARNING] DCIM/100MSDCF/DSC00001.JPG: no capture date in metadata; using file modification time
//! ```

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fmt::Result as FmtResult;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// Only our own crates make it into the log.
const CRATES: [&str; 6] = ["lens_sorter", "lens_library", "lens_index", "lens_media", "lens_storage", "lens_config"];

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        _ => "DEBUG",
    }
}

/// `{YYYY-MM-DD HH:MM:SS} [{LEVEL}] {message}` in local time.
pub struct RunLogFormat;
impl<S, N> FormatEvent<S, N> for RunLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> FmtResult {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let timestamp = now
            .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
            .map_err(|_| std::fmt::Error)?;
        write!(writer, "{timestamp} [{}] ", level_name(event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn targets(level: LevelFilter) -> Targets {
    CRATES.into_iter().fold(Targets::new(), |targets, name| targets.with_target(name, level))
}

/// Install the global subscriber.
///
/// `log_file` is appended to, and created if need be. The console only gets
/// output when `verbose`, which also adds DEBUG lines to the log file.
pub fn init(log_file: Option<&Path>, verbose: bool) -> Result<()> {
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .or_raise(|| ErrorKind::Log(path.to_path_buf()))?;
            let layer = tracing_subscriber::fmt::layer()
                .event_format(RunLogFormat)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(targets(level));
            Some(layer)
        },
        None => None,
    };
    let console_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(targets(LevelFilter::DEBUG))
    });
    tracing_subscriber::registry().with(file_layer).with(console_layer).init();
    Ok(())
}
