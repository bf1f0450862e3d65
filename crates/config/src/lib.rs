//! Layered configuration for lens-sorter.
//!
//! Layers, lowest precedence first:
//!
//! 1. built-in defaults,
//! 2. `lens-sorter.toml` in the platform configuration directory,
//! 3. a file named explicitly (`--config`),
//! 4. `lens-sorter.toml` in the archive root,
//! 5. `LENS_`-prefixed environment variables (`__` separates nested keys,
//!    e.g. `LENS_THUMBNAILS__WIDTH=200`),
//! 6. overrides set programmatically (command-line flags).
//!
//! The archive root is itself configurable, so it is resolved from every
//! other layer before the archive-local file is read.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the configuration file, both in the platform configuration
/// directory and in the archive root.
pub const CONFIG_FILE: &str = "lens-sorter.toml";
/// Produces `{YYYYMMDD}_{HHMMSS}_{original stem}`.
pub const DEFAULT_NAMING_TEMPLATE: &str = "{{ date }}_{{ time }}_{{ stem }}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Inbox directory scanned for new media.
    pub input: PathBuf,
    /// Archive root.
    pub output: PathBuf,
    /// Plan and report without touching anything.
    pub dry_run: bool,
    /// Index document name, relative to the archive root.
    pub index_file: String,
    /// Run log name, relative to the archive root.
    pub log_file: String,
    pub naming: NamingConfig,
    pub thumbnails: ThumbnailConfig,
    pub engine: EngineConfig,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::from("./_inbox"),
            output: PathBuf::from("."),
            dry_run: false,
            index_file: "_index.json".to_string(),
            log_file: "organize.log".to_string(),
            naming: NamingConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// [upon](https://docs.rs/upon) template for the file stem. Variables:
    /// `date`, `time`, `stem`, `device`, `kind`.
    pub template: String,
}
impl Default for NamingConfig {
    fn default() -> Self {
        Self { template: DEFAULT_NAMING_TEMPLATE.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub enabled: bool,
    /// Maximum width in pixels.
    pub width: u32,
}
impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self { enabled: true, width: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How many files may have their metadata read ahead of processing.
    pub metadata_concurrency: usize,
    /// Flush the index after this many archived files.
    pub flush_every: usize,
}
impl Default for EngineConfig {
    fn default() -> Self {
        Self { metadata_concurrency: 4, flush_every: 50 }
    }
}

impl Config {
    /// Check values the type system can't.
    pub fn validate(&self) -> Result<()> {
        if self.thumbnails.width == 0 {
            exn::bail!(ErrorKind::Invalid { key: "thumbnails.width", reason: "must be at least 1".into() });
        }
        if self.engine.metadata_concurrency == 0 {
            exn::bail!(ErrorKind::Invalid { key: "engine.metadata_concurrency", reason: "must be at least 1".into() });
        }
        if self.engine.flush_every == 0 {
            exn::bail!(ErrorKind::Invalid { key: "engine.flush_every", reason: "must be at least 1".into() });
        }
        for (key, name) in [("index_file", &self.index_file), ("log_file", &self.log_file)] {
            if !is_plain_file_name(name) {
                exn::bail!(ErrorKind::Invalid { key, reason: format!("`{name}` must be a plain file name") });
            }
        }
        if self.naming.template.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid { key: "naming.template", reason: "must not be empty".into() });
        }
        Ok(())
    }

    /// Inbox location made absolute against the current directory.
    pub fn input_dir(&self) -> Result<PathBuf> {
        absolute(&self.input)
    }

    /// Archive root made absolute against the current directory.
    pub fn output_dir(&self) -> Result<PathBuf> {
        absolute(&self.output)
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).or_raise(|| ErrorKind::Path(path.display().to_string()))
}

/// Builds a [`Config`] from the layers described in the crate docs.
///
/// # Example
///
/// ```no_run
/// use lens_config::ConfigLoader;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConfigLoader::new().set("dry_run", true).load()?;
/// assert!(config.dry_run);
/// # Ok(())
/// # }
/// ```
pub struct ConfigLoader {
    user_file: Option<PathBuf>,
    explicit_file: Option<PathBuf>,
    overrides: Figment,
}
impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
impl ConfigLoader {
    /// Loader reading the platform configuration directory.
    pub fn new() -> Self {
        let user_file = ProjectDirs::from("", "", "lens-sorter").map(|dirs| dirs.config_dir().join(CONFIG_FILE));
        Self { user_file, ..Self::isolated() }
    }

    /// Loader that ignores the platform configuration directory.
    pub fn isolated() -> Self {
        Self { user_file: None, explicit_file: None, overrides: Figment::new() }
    }

    /// Read an additional configuration file, taking precedence over the
    /// platform one. Unlike the implicit files it must exist.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// Override a (dotted) key, e.g. `set("thumbnails.enabled", false)`.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Override a key only when a value is present.
    pub fn set_some<T: Serialize>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    fn env() -> Env {
        Env::prefixed("LENS_").split("__")
    }

    pub fn load(&self) -> Result<Config> {
        let mut base = Figment::from(Serialized::defaults(Config::default()));
        if let Some(user) = &self.user_file {
            tracing::trace!(file = %user.display(), "Reading user configuration (if present)");
            base = base.merge(Toml::file(user));
        }
        if let Some(explicit) = &self.explicit_file {
            if !explicit.is_file() {
                exn::bail!(ErrorKind::Path(explicit.display().to_string()));
            }
            base = base.merge(Toml::file(absolute(explicit)?));
        }

        let output: PathBuf = base
            .clone()
            .merge(Self::env())
            .merge(self.overrides.clone())
            .extract_inner("output")
            .or_raise(|| ErrorKind::Load)?;
        // Absolute, so figment doesn't go looking in parent directories.
        let archive_file = absolute(&output)?.join(CONFIG_FILE);
        tracing::trace!(file = %archive_file.display(), "Reading archive configuration (if present)");

        let config: Config = base
            .merge(Toml::file(archive_file))
            .merge(Self::env())
            .merge(self.overrides.clone())
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }
}
