//! Host directory backend.
//!
//! Resolves logical paths against a real directory. Lookups go straight to the
//! host filesystem on every call, so files added after mounting are visible.

use super::backend::{Backend, BackendKind, DirEntry, EntryType, LinkPolicy};
use super::file_handle::FileHandle;
use super::path_utils::VfsPath;
use super::VfsError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// A mounted host directory.
///
/// `user_dir` is the directory as it was mounted and is what
/// [`real_dir`](Backend::real_dir) reports. With a subdirectory remap, lookups
/// resolve below `user_dir/subdir` instead.
#[derive(Debug, Clone)]
pub struct DirBackend {
    user_dir: PathBuf,
    root: PathBuf,
}

impl DirBackend {
    /// Mounts `dir`, optionally remapped to its subdirectory `subdir`.
    ///
    /// # Errors
    /// Returns `VfsError::Mount` if the resolved root is missing or is not a
    /// directory.
    pub fn new(dir: impl Into<PathBuf>, subdir: Option<&str>) -> Result<Self, VfsError> {
        let user_dir = dir.into();
        let root = match subdir {
            Some(sub) => user_dir.join(sub),
            None => user_dir.clone(),
        };
        match fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => Ok(Self { user_dir, root }),
            Ok(_) => Err(VfsError::mount(root.display().to_string(), "not a directory")),
            Err(err) => Err(VfsError::mount(root.display().to_string(), err.to_string())),
        }
    }

    /// The directory lookups resolve against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &VfsPath) -> PathBuf {
        if path.is_root() {
            self.root.clone()
        } else {
            self.root.join(path.as_str())
        }
    }

    fn classify(entry: &fs::DirEntry, links: LinkPolicy) -> Option<EntryType> {
        let file_type = entry.file_type().ok()?;
        if file_type.is_symlink() {
            if links == LinkPolicy::Skip {
                return None;
            }
            // follow the link to report what it points at
            let target = fs::metadata(entry.path()).ok()?;
            return Some(if target.is_dir() { EntryType::Directory } else { EntryType::File });
        }
        Some(if file_type.is_dir() { EntryType::Directory } else { EntryType::File })
    }
}

impl Backend for DirBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Directory
    }

    fn exists(&self, path: &VfsPath) -> bool {
        match fs::metadata(self.resolve(path)) {
            // `file.ext/` must not count as an existing file
            Ok(meta) => !path.has_dir_hint() || meta.is_dir(),
            Err(_) => false,
        }
    }

    fn is_directory(&self, path: &VfsPath) -> bool {
        fs::metadata(self.resolve(path)).is_ok_and(|meta| meta.is_dir())
    }

    fn open_read(&self, path: &VfsPath) -> Result<FileHandle, VfsError> {
        let full = self.resolve(path);
        match fs::metadata(&full) {
            Ok(meta) if meta.is_file() && !path.has_dir_hint() => {}
            _ => return Err(VfsError::NotFound(path.to_string())),
        }
        trace!(path = %full.display(), "open native file");
        let file = fs::File::open(&full)?;
        Ok(FileHandle::native(file)?)
    }

    fn list(&self, dir: &VfsPath, links: LinkPolicy) -> Vec<DirEntry> {
        let Ok(read_dir) = fs::read_dir(self.resolve(dir)) else {
            return Vec::new();
        };
        read_dir
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let entry_type = Self::classify(&entry, links)?;
                let name = entry.file_name().into_string().ok()?;
                Some(DirEntry { name, entry_type })
            })
            .collect()
    }

    fn real_dir(&self, path: &VfsPath) -> Option<PathBuf> {
        self.exists(path).then(|| self.user_dir.clone())
    }

    fn real_path(&self, path: &VfsPath) -> Option<PathBuf> {
        Some(self.resolve(path))
    }

    fn writable_root(&self) -> Option<&Path> {
        Some(&self.root)
    }

    fn is_symlink(&self, path: &VfsPath) -> bool {
        fs::symlink_metadata(self.resolve(path)).is_ok_and(|meta| meta.file_type().is_symlink())
    }
}
