//! The contract every mounted source fulfils.

use super::file_handle::FileHandle;
use super::path_utils::VfsPath;
use super::VfsError;
use std::fmt;
use std::path::{Path, PathBuf};

/// Which kind of source a backend adapts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Directory,
    Zip,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Directory => f.write_str("directory"),
            BackendKind::Zip => f.write_str("zip"),
        }
    }
}

/// Type of directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    File,
    Directory,
}

/// A directory entry returned by [`Backend::list`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirEntry {
    /// Name of the entry (not full path).
    pub name: String,
    /// Type of entry.
    pub entry_type: EntryType,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self { name: name.into(), entry_type: EntryType::File }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self { name: name.into(), entry_type: EntryType::Directory }
    }
}

/// Whether symbolic links show up in directory listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkPolicy {
    #[default]
    Skip,
    Follow,
}

/// A mounted source: a host directory or a zip archive.
///
/// All operations take a validated [`VfsPath`] relative to the backend's own
/// root; remaps have already been applied by the backend itself. Lookups are
/// read-only, so a backend may be queried from several threads at once.
pub trait Backend: fmt::Debug + Send + Sync {
    fn kind(&self) -> BackendKind;

    /// `true` if the path names a file or a directory in this source.
    fn exists(&self, path: &VfsPath) -> bool;

    /// `true` only for directories; files and missing paths report `false`.
    fn is_directory(&self, path: &VfsPath) -> bool;

    /// Opens a file for reading.
    ///
    /// Returns `Err(VfsError::NotFound)` if this source has no such file.
    fn open_read(&self, path: &VfsPath) -> Result<FileHandle, VfsError>;

    /// Immediate children of a directory. Missing or non-directory paths list
    /// as empty.
    fn list(&self, dir: &VfsPath, links: LinkPolicy) -> Vec<DirEntry>;

    /// The host location reported for a path this source contains: the
    /// mounted directory as given, or the archive file.
    fn real_dir(&self, path: &VfsPath) -> Option<PathBuf>;

    /// Host path of an entry, for backends that are plain directories.
    fn real_path(&self, path: &VfsPath) -> Option<PathBuf> {
        let _ = path;
        None
    }

    /// Directory that writes may go to, if this source is writable.
    fn writable_root(&self) -> Option<&Path> {
        None
    }

    fn is_symlink(&self, path: &VfsPath) -> bool {
        let _ = path;
        false
    }
}
