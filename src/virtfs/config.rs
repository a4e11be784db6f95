//! Declarative mount configuration, loaded from TOML.
//!
//! ```toml
//! permit_links = false
//! write_dir = "/home/user/.local/share/client"
//! max_archive_size = 200_000_000
//!
//! [[mounts]]
//! path = "data"
//! kind = "dir"
//!
//! [[mounts]]
//! path = "data/music.zip"
//! kind = "zip"
//! subdir = "music"
//! append = false
//!
//! [[archives]]
//! dir = "updates"
//! pattern = "*.zip"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::VfsError;

/// Options and mounts for building a [`VirtFs`](super::VirtFs).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// List symbolic links in directory mounts.
    pub permit_links: bool,

    /// Directory that writes resolve against.
    pub write_dir: Option<PathBuf>,

    /// Refuse to mount archives larger than this many bytes.
    pub max_archive_size: Option<u64>,

    /// Mounts, applied in order.
    pub mounts: Vec<MountSpec>,

    /// Archive searches, run after `mounts`.
    pub archives: Vec<ArchiveSearch>,
}

/// Which backend a configured mount uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Dir,
    Zip,
}

/// One configured mount.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MountSpec {
    /// Host path of the directory or archive.
    pub path: PathBuf,

    pub kind: MountKind,

    /// Remap inside the source.
    #[serde(default)]
    pub subdir: Option<String>,

    /// `true` appends (lower precedence), `false` prepends.
    #[serde(default = "default_append")]
    pub append: bool,
}

/// Mount every archive in a virtual directory whose name matches a glob.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArchiveSearch {
    /// Logical directory to search.
    pub dir: String,

    /// Glob for archive names (e.g., `"*.zip"`).
    pub pattern: String,

    #[serde(default = "default_append")]
    pub append: bool,
}

fn default_append() -> bool {
    true
}

impl VfsConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, VfsError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    /// `VfsError::Io` if the file cannot be read, `VfsError::Config` if it is
    /// not valid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VfsError> {
        let path = path.as_ref();
        tracing::debug!("loading vfs config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
