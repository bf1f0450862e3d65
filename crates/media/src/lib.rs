//! Media understanding for lens-sorter: what a camera file is, which device
//! wrote it, and when it was captured.

pub mod error;
mod kind;
mod profile;
mod provider;
mod resolver;
mod source;

pub use crate::kind::{Classification, DiscardReason, MediaKind};
pub use crate::profile::{DeviceFilter, DeviceProfile, Dji, Generic, GoPro, Sony, split_name};
pub use crate::provider::{ExifTool, MetadataProvider, Tags};
pub use crate::resolver::{
    FallbackReason, MetadataResolver, ResolvedMetadata, TimestampSource, civil, parse_tag_datetime,
};
pub use crate::source::SourceFile;
