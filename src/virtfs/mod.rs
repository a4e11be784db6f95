mod backend;
mod config;
mod dir_backend;
mod facade;
mod file_handle;
mod filters;
mod mount_table;
mod path_utils;
mod zip_backend;

#[cfg(test)]
mod test_support;

pub use backend::{Backend, BackendKind, DirEntry, EntryType, LinkPolicy};
pub use config::{ArchiveSearch, MountKind, MountSpec, VfsConfig};
pub use dir_backend::DirBackend;
pub use facade::VirtFs;
pub use file_handle::FileHandle;
pub use filters::FilterSet;
pub use mount_table::{Append, MountEntry, MountInfo, MountTable};
pub use path_utils::{
    is_safe_path, join_path, normalize_path, normalize_real_path, parent_dir, validate_path,
    VfsPath,
};
pub use zip_backend::{ZipBackend, ZipEntryInfo, ZipIndex};

use thiserror::Error;
use zip::result::ZipError;

// ---------------------------------------------------------------------------
// Custom error type (thiserror)
// ---------------------------------------------------------------------------

/// Error type for virtual filesystem operations.
///
/// Routine misses (a file that no mount provides) are never errors: lookups
/// report them as `false`, `None` or an empty listing. The variants here cover
/// rejected input, failed mounts, programmer errors around unmounting, and
/// damaged archives.
#[derive(Error, Debug)]
pub enum VfsError {
    /// The path contains a traversal component (`..`) or the
    /// `(unreachable)` marker and was rejected before touching any backend.
    #[error("unsafe path rejected: {0}")]
    PathTraversal(String),

    /// A backend was asked for an entry it does not have.
    #[error("not found: {0}")]
    NotFound(String),

    /// A directory or archive could not be mounted. The mount table is left
    /// unchanged.
    #[error("cannot mount {path}: {reason}")]
    Mount { path: String, reason: String },

    /// No mount matches the `(path, subdir)` pair given to an unmount call.
    #[error("nothing mounted at {path} with subdir {subdir:?}")]
    UnmountMismatch { path: String, subdir: Option<String> },

    /// An archive entry failed its CRC check or was truncated.
    #[error("corrupt entry {entry} in {archive}: {reason}")]
    CorruptArchive {
        archive: String,
        entry: String,
        reason: String,
    },

    /// The archive size exceeds the configured maximum allowed size.
    #[error("Archive size {0} exceeds limit {1}")]
    ArchiveTooLarge(u64, u64),

    /// A filter path or glob pattern was invalid (empty, contains "..", etc.).
    #[error("Invalid glob pattern: {0}")]
    InvalidPattern(String),

    /// An error originating from the `zip` crate.
    #[error("ZIP error: {0}")]
    Zip(#[from] ZipError),

    /// An I/O error from the host filesystem.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl VfsError {
    pub(crate) fn mount(path: impl Into<String>, reason: impl Into<String>) -> Self {
        VfsError::Mount {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
