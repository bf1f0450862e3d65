//! Photo thumbnails via an external image tool.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::instrument;

/// Produces a scaled-down copy of a photo.
#[async_trait]
pub trait Thumbnailer: Send + Sync {
    /// Write a thumbnail of `source` to `target` (both local absolute paths),
    /// at most `width` pixels wide. The target directory may not exist yet.
    async fn generate(&self, source: &Path, target: &Path, width: u32) -> Result<()>;
}

/// Image tools known to produce thumbnails, in order of preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageTool {
    /// ImageMagick 7.
    Magick { path: PathBuf },
    /// ImageMagick 6.
    Convert { path: PathBuf },
    /// macOS Scriptable Image Processing System.
    Sips { path: PathBuf },
}
impl ImageTool {
    const CANDIDATES: [&'static str; 3] = ["magick", "convert", "sips"];

    /// Find the first supported tool in `PATH`.
    pub fn discover() -> Result<Self> {
        for exe in Self::CANDIDATES {
            if let Ok(path) = which::which(exe) {
                tracing::debug!(tool = %path.display(), "Discovered thumbnail tool");
                return Ok(match exe {
                    "magick" => Self::Magick { path },
                    "convert" => Self::Convert { path },
                    _ => Self::Sips { path },
                });
            }
        }
        tracing::info!("No thumbnail tool found in PATH");
        exn::bail!(ErrorKind::ThumbnailerNotFound(Self::CANDIDATES.join(", ")));
    }

    fn command(&self, source: &Path, target: &Path, width: u32) -> Command {
        let mut command = match self {
            Self::Magick { path } | Self::Convert { path } => {
                let mut command = Command::new(path);
                command.arg(source).args(["-auto-orient", "-thumbnail", &format!("{width}x>")]).arg(target);
                command
            },
            Self::Sips { path } => {
                let mut command = Command::new(path);
                command.args(["-Z", &width.to_string()]).arg(source).arg("--out").arg(target);
                command
            },
        };
        // Ctrl-C in the terminal must not take the tool down mid-file.
        #[cfg(unix)]
        command.process_group(0);
        command
    }
}

#[async_trait]
impl Thumbnailer for ImageTool {
    #[instrument(skip(self), fields(source = %source.display()))]
    async fn generate(&self, source: &Path, target: &Path, width: u32) -> Result<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Thumbnail)?;
        }
        let output = self
            .command(source, target, width)
            .kill_on_drop(true)
            .output()
            .await
            .or_raise(|| ErrorKind::Thumbnail)?;
        if !output.status.success() {
            tracing::debug!(stderr = %String::from_utf8_lossy(&output.stderr).trim(), "Thumbnail tool failed");
            // Don't leave a half-written thumbnail behind.
            let _ = tokio::fs::remove_file(target).await;
            exn::bail!(ErrorKind::Thumbnail);
        }
        Ok(())
    }
}
