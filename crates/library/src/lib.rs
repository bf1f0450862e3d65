//! The lens-sorter engine.
//!
//! Moves camera files out of an inbox into a date-partitioned archive:
//! [`organize`] does one run over the inbox and [`annotate`] labels a date
//! partition with an event name afterwards. Both work on a [`Session`], which
//! owns the archive backend and its index for the duration of the run.

mod annotate;
pub mod error;
mod mover;
mod organize;
mod plan;
mod report;
mod scan;
mod session;
mod template;
mod thumbnail;

pub use crate::annotate::{Annotation, EventNamer, NamingDecision, annotate, name_events};
pub use crate::mover::{Placement, place};
pub use crate::organize::{OrganizeEvent, organize, organize_file};
pub use crate::plan::{Claims, MAX_SUFFIX, PathPlanner, Plan};
pub use crate::report::{DayCount, Disposition, FileOutcome, Issue, RunReport, Severity};
pub use crate::scan::{Work, discover, open_inbox, pair};
pub use crate::session::Session;
pub use crate::template::{NameParts, NameTemplate};
pub use crate::thumbnail::{ImageTool, Thumbnailer};
pub use lens_media::DiscardReason;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use lens_config::Config;
use lens_media::{DeviceFilter, ExifTool, MetadataProvider, MetadataResolver};
use std::sync::Arc;

/// Everything about a run that doesn't change from file to file.
pub struct Context {
    pub filter: DeviceFilter,
    pub resolver: MetadataResolver,
    pub planner: PathPlanner,
    /// `None` turns thumbnail generation off.
    pub thumbnailer: Option<Arc<dyn Thumbnailer>>,
    pub thumbnail_width: u32,
    pub metadata_concurrency: usize,
    pub flush_every: usize,
}
impl Context {
    /// Build a context from `config` with the given collaborators.
    pub fn new(
        config: &Config,
        provider: Arc<dyn MetadataProvider>,
        thumbnailer: Option<Arc<dyn Thumbnailer>>,
    ) -> Result<Self> {
        let template: NameTemplate = config.naming.template.parse()?;
        Ok(Self {
            filter: DeviceFilter::default(),
            resolver: MetadataResolver::new(provider),
            planner: PathPlanner::new(template),
            thumbnailer,
            thumbnail_width: config.thumbnails.width,
            metadata_concurrency: config.engine.metadata_concurrency,
            flush_every: config.engine.flush_every,
        })
    }

    /// Build a context from `config`, locating the external tools in `PATH`.
    ///
    /// ExifTool is always required. An image tool is only looked for when
    /// thumbnails are enabled and this isn't a dry run, and not finding one
    /// is then fatal.
    pub fn discover(config: &Config) -> Result<Self> {
        let provider = ExifTool::discover().or_raise(|| ErrorKind::MetadataProvider)?;
        let thumbnailer: Option<Arc<dyn Thumbnailer>> = match config.thumbnails.enabled && !config.dry_run {
            true => Some(Arc::new(ImageTool::discover()?)),
            false => None,
        };
        Self::new(config, Arc::new(provider), thumbnailer)
    }
}
