//! Embedded metadata providers.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::instrument;

/// The handful of embedded tags the organizer cares about, verbatim as the
/// provider reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tags {
    #[serde(default, deserialize_with = "text")]
    pub date_time_original: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub create_date: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub model: Option<String>,
}

/// ExifTool emits tag values that look numeric as JSON numbers (a `Model` of
/// `7`, say); keep them as their textual form.
fn text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(value)) => Some(value),
        Some(other) => Some(other.to_string()),
    })
}

/// Source of embedded metadata for a file on the local filesystem.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Read the capture tags of the file at `path`.
    ///
    /// Any error here is treated by the resolver as "no metadata".
    async fn read_tags(&self, path: &Path) -> Result<Tags>;
}

/// [ExifTool](https://exiftool.org) as a metadata provider.
///
/// One process per file; calls carry no timeout.
#[derive(Debug, Clone)]
pub struct ExifTool {
    path: PathBuf,
}
impl ExifTool {
    const NAME: &'static str = "exiftool";

    /// Locate `exiftool` in `PATH`.
    pub fn discover() -> Result<Self> {
        match which::which(Self::NAME) {
            Ok(path) => {
                tracing::debug!(exiftool = %path.display(), "Discovered metadata provider");
                Ok(Self { path })
            },
            Err(_) => exn::bail!(ErrorKind::ToolNotFound(Self::NAME)),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse `exiftool -json` output: an array with one object per file.
    fn parse(stdout: &[u8]) -> Result<Tags> {
        let mut tags: Vec<Tags> = serde_json::from_slice(stdout).or_raise(|| ErrorKind::Output(Self::NAME))?;
        if tags.is_empty() {
            exn::bail!(ErrorKind::Output(Self::NAME));
        }
        Ok(tags.swap_remove(0))
    }
}

#[async_trait]
impl MetadataProvider for ExifTool {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn read_tags(&self, path: &Path) -> Result<Tags> {
        let mut command = Command::new(&self.path);
        command
            .args(["-json", "-DateTimeOriginal", "-CreateDate", "-Model"])
            .arg(path)
            .kill_on_drop(true);
        // Keep the terminal's SIGINT away from the child; cancellation is ours to decide.
        #[cfg(unix)]
        command.process_group(0);
        let output = command
            .output()
            .await
            .or_raise(|| ErrorKind::Spawn(Self::NAME))?;
        if !output.status.success() {
            exn::bail!(ErrorKind::ToolFailed {
                tool: Self::NAME,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Self::parse(&output.stdout)
    }
}
