use super::backend::{Backend, BackendKind, DirEntry, EntryType, LinkPolicy};
use super::config::{MountKind, VfsConfig};
use super::dir_backend::DirBackend;
use super::file_handle::FileHandle;
use super::filters::FilterSet;
use super::mount_table::{Append, MountEntry, MountInfo, MountTable};
use super::path_utils::{is_safe_path, join_path, normalize_path, normalize_real_path, validate_path, VfsPath};
use super::zip_backend::ZipBackend;
use super::VfsError;
use rustc_hash::FxHashSet;
use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};
use tracing::{debug, info, trace, warn};

// ---------------------------------------------------------------------------
// VirtFs – the overlay namespace
// ---------------------------------------------------------------------------

/// A virtual filesystem built from an ordered stack of mounted directories
/// and zip archives.
///
/// Every lookup takes a logical path (either separator, any number of
/// repeated separators), rejects traversal attempts, and asks the mounts
/// front to back. The front of the stack wins: prepending a mount makes it
/// shadow everything mounted before it, appending makes it a fallback.
///
/// Mounting and unmounting take `&mut self`, lookups take `&self`, so the
/// borrow checker already rules out a mount racing a lookup. Share a `VirtFs`
/// between threads behind an `RwLock` if mounts change at runtime.
///
/// # Example
/// ```no_run
/// # use virtfs_overlay::{Append, VirtFs};
/// # fn main() -> Result<(), virtfs_overlay::VfsError> {
/// let mut vfs = VirtFs::new();
/// vfs.mount_dir("data", Append::Back)?;
/// vfs.mount_zip("updates/update-1.zip", Append::Front)?;
///
/// if let Some(mut file) = vfs.open_read("graphics/items/hide.png")? {
///     let len = file.file_length() as usize;
///     let mut buf = vec![0u8; len];
///     file.read(&mut buf, 1, len)?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct VirtFs {
    table: MountTable,
    links: LinkPolicy,
    write_dir: Option<PathBuf>,
    /// Archives larger than this are refused at mount time.
    max_archive_size: Option<u64>,
}

impl VirtFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a filesystem from a declarative configuration.
    ///
    /// Options are applied first, then `mounts` in order, then every
    /// `archives` search. A mount that fails is logged and skipped; it does
    /// not abort the rest of the configuration.
    ///
    /// # Errors
    /// Returns `VfsError::InvalidPattern` if an archive search pattern is
    /// invalid, or `VfsError::PathTraversal` if a search directory is unsafe.
    pub fn from_config(config: &VfsConfig) -> Result<Self, VfsError> {
        let mut vfs = VirtFs::new();
        vfs.permit_links(config.permit_links);
        vfs.set_max_archive_size(config.max_archive_size);
        if let Some(dir) = &config.write_dir {
            vfs.set_write_dir(dir.clone());
        }

        for spec in &config.mounts {
            let path = spec.path.to_string_lossy();
            let subdir = spec.subdir.as_deref().unwrap_or_default();
            let result = match spec.kind {
                MountKind::Dir => vfs.mount_dir2(&path, subdir, spec.append),
                MountKind::Zip => vfs.mount_zip2(&path, subdir, spec.append),
            };
            if let Err(err) = result {
                warn!(path = %path, error = %err, "skipping configured mount");
            }
        }

        for search in &config.archives {
            let filter = FilterSet::new().add_glob(&search.pattern)?;
            let count = vfs.search_and_add_archives(&search.dir, &filter, search.append)?;
            debug!(dir = %search.dir, pattern = %search.pattern, count, "archive search");
        }

        Ok(vfs)
    }

    // -----------------------------------------------------------------------
    // Options
    // -----------------------------------------------------------------------

    /// Whether symbolic links show up in directory listings. Off by default.
    pub fn permit_links(&mut self, permit: bool) {
        self.links = if permit { LinkPolicy::Follow } else { LinkPolicy::Skip };
    }

    pub fn set_max_archive_size(&mut self, limit: Option<u64>) {
        self.max_archive_size = limit;
    }

    /// Sets the directory that [`mkdir`](Self::mkdir), [`remove`](Self::remove)
    /// and the `open_write` family resolve against. Without one, writes go to
    /// the highest-priority directory mount.
    pub fn set_write_dir(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        info!(path = %path.display(), "set write dir");
        self.write_dir = Some(path);
    }

    pub fn write_dir(&self) -> Option<&Path> {
        self.write_dir.as_deref()
    }

    // -----------------------------------------------------------------------
    // Mounting
    // -----------------------------------------------------------------------

    /// Mounts a directory or a zip archive, whichever `path` is on the host.
    pub fn mount(&mut self, path: &str, append: impl Into<Append>) -> Result<(), VfsError> {
        if Path::new(path).is_dir() {
            self.mount_dir(path, append)
        } else {
            self.mount_zip(path, append)
        }
    }

    pub fn mount_dir(&mut self, path: &str, append: impl Into<Append>) -> Result<(), VfsError> {
        self.add_mount(path, BackendKind::Directory, "", append.into())
    }

    /// Mounts the subdirectory `subdir` of the host directory `path` as the
    /// root of the namespace.
    pub fn mount_dir2(&mut self, path: &str, subdir: &str, append: impl Into<Append>) -> Result<(), VfsError> {
        self.add_mount(path, BackendKind::Directory, subdir, append.into())
    }

    pub fn mount_zip(&mut self, path: &str, append: impl Into<Append>) -> Result<(), VfsError> {
        self.add_mount(path, BackendKind::Zip, "", append.into())
    }

    /// Mounts only the entries below `subdir` inside the archive, with that
    /// prefix removed.
    ///
    /// # Errors
    /// Fails like [`mount_zip`](Self::mount_zip), and also when the archive
    /// has nothing under `subdir`.
    pub fn mount_zip2(&mut self, path: &str, subdir: &str, append: impl Into<Append>) -> Result<(), VfsError> {
        self.add_mount(path, BackendKind::Zip, subdir, append.into())
    }

    /// Builds the backend and inserts it into the table.
    ///
    /// # Arguments
    /// * `path` – host path of the directory or archive.
    /// * `kind` – which backend to build.
    /// * `subdir` – remap inside the source; `""` or `"/"` for none.
    /// * `append` – insert at the back (`Append::Back`) or the front.
    ///
    /// # Errors
    /// * `VfsError::PathTraversal` if `subdir` is unsafe.
    /// * `VfsError::Mount` if the same source is already mounted with the
    ///   same subdir, or the backend cannot be built.
    ///
    /// The table is unchanged on error.
    fn add_mount(&mut self, path: &str, kind: BackendKind, subdir: &str, append: Append) -> Result<(), VfsError> {
        if !is_safe_path(subdir) {
            warn!(path, subdir, "rejected unsafe mount subdir");
            return Err(VfsError::PathTraversal(subdir.to_string()));
        }
        let key = normalize_real_path(path);
        let subdir = subdir_key(subdir);

        if self.table.find(&key, kind, subdir.as_deref()).is_some() {
            warn!(path = %key, subdir = ?subdir, "{kind} already mounted");
            return Err(VfsError::mount(key, "already mounted"));
        }

        let backend: Result<Box<dyn Backend>, VfsError> = match kind {
            BackendKind::Directory => {
                DirBackend::new(&key, subdir.as_deref()).map(|b| Box::new(b) as Box<dyn Backend>)
            }
            BackendKind::Zip => ZipBackend::open(&key, subdir.as_deref(), self.max_archive_size)
                .map(|b| Box::new(b) as Box<dyn Backend>),
        };
        let backend = backend.inspect_err(|err| warn!(error = %err, "{kind} mount failed"))?;

        match kind {
            BackendKind::Directory => info!(path = %key, subdir = ?subdir, ?append, "Add virtual directory"),
            BackendKind::Zip => info!(path = %key, subdir = ?subdir, ?append, "Add virtual zip"),
        }
        self.table.insert(
            MountEntry {
                original_path: key,
                kind,
                subdir,
                backend,
            },
            append,
        )
    }

    // -----------------------------------------------------------------------
    // Unmounting
    // -----------------------------------------------------------------------

    /// Removes a directory mounted with [`mount_dir`](Self::mount_dir).
    ///
    /// # Errors
    /// Returns `VfsError::UnmountMismatch` if `path` is not mounted as a
    /// directory without a subdir. That always indicates a caller bug.
    pub fn unmount_dir(&mut self, path: &str) -> Result<(), VfsError> {
        self.remove_mount(path, BackendKind::Directory, "")
    }

    pub fn unmount_dir2(&mut self, path: &str, subdir: &str) -> Result<(), VfsError> {
        self.remove_mount(path, BackendKind::Directory, subdir)
    }

    pub fn unmount_zip(&mut self, path: &str) -> Result<(), VfsError> {
        self.remove_mount(path, BackendKind::Zip, "")
    }

    pub fn unmount_zip2(&mut self, path: &str, subdir: &str) -> Result<(), VfsError> {
        self.remove_mount(path, BackendKind::Zip, subdir)
    }

    fn remove_mount(&mut self, path: &str, kind: BackendKind, subdir: &str) -> Result<(), VfsError> {
        let key = normalize_real_path(path);
        let subdir = subdir_key(subdir);
        let removed = self
            .table
            .remove(&key, kind, subdir.as_deref())
            .inspect_err(|err| warn!(error = %err, "{kind} unmount failed"))?;
        match removed.kind {
            BackendKind::Directory => info!(path = %removed.original_path, subdir = ?removed.subdir, "Remove virtual directory"),
            BackendKind::Zip => info!(path = %removed.original_path, subdir = ?removed.subdir, "Remove virtual zip"),
        }
        Ok(())
    }

    /// Unmounts everything and forgets the write directory.
    pub fn deinit(&mut self) {
        if !self.table.is_empty() {
            info!(mounts = self.table.len(), "unmount all");
        }
        self.table.clear();
        self.write_dir = None;
    }

    /// Current mounts in precedence order, highest first.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.table.infos()
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    fn checked(&self, path: &str) -> Result<VfsPath, VfsError> {
        validate_path(path).inspect_err(|_| warn!(path, "rejected unsafe path"))
    }

    /// `true` if any mount has a file or directory at `path`.
    ///
    /// # Errors
    /// Returns `VfsError::PathTraversal` for unsafe paths. A missing path is
    /// `Ok(false)`.
    pub fn exists(&self, path: &str) -> Result<bool, VfsError> {
        let path = self.checked(path)?;
        let hit = self.table.find_first(|b| b.exists(&path));
        trace!(path = %path, found = hit.is_some(), "exists");
        Ok(hit.is_some())
    }

    /// `true` if any mount has a directory at `path`.
    pub fn is_directory(&self, path: &str) -> Result<bool, VfsError> {
        let path = self.checked(path)?;
        Ok(self.table.find_first(|b| b.is_directory(&path)).is_some())
    }

    /// Opens a file from the first mount that has it.
    ///
    /// # Returns
    /// `Ok(None)` if no mount provides a regular file at `path`.
    ///
    /// # Errors
    /// * `VfsError::PathTraversal` for unsafe paths.
    /// * `VfsError::CorruptArchive` if the archive entry that would be
    ///   returned fails its integrity check.
    pub fn open_read(&self, path: &str) -> Result<Option<FileHandle>, VfsError> {
        let path = self.checked(path)?;
        for entry in self.table.iter() {
            match entry.backend.open_read(&path) {
                Ok(file) => {
                    trace!(path = %path, source = %entry.original_path, "open_read");
                    return Ok(Some(file));
                }
                Err(VfsError::NotFound(_)) => {}
                Err(err @ VfsError::CorruptArchive { .. }) => {
                    warn!(error = %err, "open_read failed");
                    return Err(err);
                }
                Err(err) => debug!(path = %path, source = %entry.original_path, error = %err, "open_read miss"),
            }
        }
        Ok(None)
    }

    /// Union of the immediate children of `dir` across every mount, first
    /// occurrence of each name wins.
    fn union_entries(&self, dir: &VfsPath) -> Vec<DirEntry> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        for entry in self.table.iter() {
            for child in entry.backend.list(dir, self.links) {
                if seen.insert(child.name.clone()) {
                    out.push(child);
                }
            }
        }
        out
    }

    fn names_of(&self, dir: &str, wanted: Option<EntryType>) -> Result<Vec<String>, VfsError> {
        let dir = self.checked(dir)?;
        Ok(self
            .union_entries(&dir)
            .into_iter()
            .filter(|e| wanted.is_none_or(|t| e.entry_type == t))
            .map(|e| e.name)
            .collect())
    }

    /// Names of every file and directory directly inside `dir`, merged over
    /// all mounts and deduplicated. The order is unspecified.
    pub fn enumerate_files(&self, dir: &str) -> Result<Vec<String>, VfsError> {
        self.names_of(dir, None)
    }

    /// Like [`enumerate_files`](Self::enumerate_files) but only regular files.
    pub fn get_files(&self, dir: &str) -> Result<Vec<String>, VfsError> {
        self.names_of(dir, Some(EntryType::File))
    }

    pub fn get_dirs(&self, dir: &str) -> Result<Vec<String>, VfsError> {
        self.names_of(dir, Some(EntryType::Directory))
    }

    /// Files directly inside `dir`, as logical paths including `dir`.
    pub fn get_files_with_dir(&self, dir: &str) -> Result<Vec<String>, VfsError> {
        let prefix = normalize_path(dir);
        Ok(self
            .get_files(dir)?
            .into_iter()
            .map(|name| join_path(&prefix, &name))
            .collect())
    }

    /// Files directly inside `dir` whose name matches `filter`.
    pub fn get_files_in_dir(&self, dir: &str, filter: &FilterSet) -> Result<Vec<String>, VfsError> {
        let mut files = self.get_files(dir)?;
        files.retain(|name| filter.matches_str(name));
        Ok(files)
    }

    /// Host location of the first mount that has `path`: the mounted
    /// directory as it was given, or the archive file.
    pub fn get_real_dir(&self, path: &str) -> Result<Option<PathBuf>, VfsError> {
        let path = self.checked(path)?;
        Ok(self.table.find_map_first(|e| e.backend.real_dir(&path)))
    }

    /// `true` if `path` is a symbolic link in the first mount that has it.
    /// Always `false` while links are not permitted.
    pub fn is_symbolic_link(&self, path: &str) -> Result<bool, VfsError> {
        let path = self.checked(path)?;
        if self.links == LinkPolicy::Skip {
            return Ok(false);
        }
        Ok(self
            .table
            .find_first(|b| b.exists(&path))
            .is_some_and(|e| e.backend.is_symlink(&path)))
    }

    /// Reads a whole file.
    pub fn load_file(&self, path: &str) -> Result<Option<Vec<u8>>, VfsError> {
        let Some(mut file) = self.open_read(path)? else {
            return Ok(None);
        };
        let mut buf = Vec::new();
        buf.try_reserve_exact(usize::try_from(file.file_length()).unwrap_or_default())
            .map_err(|err| VfsError::Io(std::io::Error::other(err)))?;
        file.read_to_end(&mut buf)?;
        Ok(Some(buf))
    }

    /// Reads a text file and splits it into lines (`\n` or `\r\n`).
    /// Invalid UTF-8 is replaced.
    pub fn load_text_lines(&self, path: &str) -> Result<Option<Vec<String>>, VfsError> {
        Ok(self.load_file(path)?.map(|bytes| {
            String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::to_string)
                .collect()
        }))
    }

    // -----------------------------------------------------------------------
    // Archive discovery
    // -----------------------------------------------------------------------

    /// Host path of the file at `path` in the first mount that has it, if
    /// that mount is a directory.
    fn real_file(&self, path: &VfsPath) -> Option<PathBuf> {
        self.table
            .find_first(|b| b.exists(path))
            .and_then(|e| e.backend.real_path(path))
    }

    /// Mounts every archive in the virtual directory `dir` whose name
    /// matches `filter`.
    ///
    /// Archives are found through the current mounts, so `dir` is a logical
    /// path; only archives that live in a directory mount can be mounted.
    ///
    /// # Returns
    /// The number of archives mounted. Archives that fail to mount are logged
    /// and skipped.
    pub fn search_and_add_archives(
        &mut self,
        dir: &str,
        filter: &FilterSet,
        append: impl Into<Append>,
    ) -> Result<usize, VfsError> {
        let append = append.into();
        let vdir = self.checked(dir)?;
        let mut mounted = 0;
        for name in self.get_files_in_dir(dir, filter)? {
            let Some(real) = self.real_file(&vdir.join(&name)) else {
                debug!(dir = %vdir, name, "archive not on a directory mount");
                continue;
            };
            match self.mount_zip(&real.to_string_lossy(), append) {
                Ok(()) => mounted += 1,
                Err(err) => debug!(archive = %real.display(), error = %err, "archive skipped"),
            }
        }
        Ok(mounted)
    }

    /// Unmounts every archive that [`search_and_add_archives`] would mount
    /// for the same arguments.
    ///
    /// [`search_and_add_archives`]: Self::search_and_add_archives
    pub fn search_and_remove_archives(&mut self, dir: &str, filter: &FilterSet) -> Result<usize, VfsError> {
        let vdir = self.checked(dir)?;
        let mut removed = 0;
        for name in self.get_files_in_dir(dir, filter)? {
            let Some(real) = self.real_file(&vdir.join(&name)) else {
                continue;
            };
            if self.unmount_zip(&real.to_string_lossy()).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Writing
    // -----------------------------------------------------------------------

    fn write_root(&self) -> Option<PathBuf> {
        self.write_dir.clone().or_else(|| {
            self.table
                .find_map_first(|e| e.backend.writable_root().map(Path::to_path_buf))
        })
    }

    fn write_target(&self, path: &str) -> Result<Option<PathBuf>, VfsError> {
        let path = self.checked(path)?;
        let Some(root) = self.write_root() else {
            warn!(path = %path, "no writable directory");
            return Ok(None);
        };
        Ok(Some(if path.is_root() { root } else { root.join(path.as_str()) }))
    }

    /// Creates a directory and any missing parents below the write target.
    ///
    /// # Returns
    /// `Ok(true)` if the directory exists afterwards, `Ok(false)` if there is
    /// nowhere to write or creation failed.
    pub fn mkdir(&self, path: &str) -> Result<bool, VfsError> {
        let Some(target) = self.write_target(path)? else {
            return Ok(false);
        };
        match fs::create_dir_all(&target) {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(path = %target.display(), error = %err, "mkdir failed");
                Ok(false)
            }
        }
    }

    /// Deletes a file or an empty directory below the write target.
    pub fn remove(&self, path: &str) -> Result<bool, VfsError> {
        let Some(target) = self.write_target(path)? else {
            return Ok(false);
        };
        let result = match fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_dir() => fs::remove_dir(&target),
            Ok(_) => fs::remove_file(&target),
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(path = %target.display(), error = %err, "remove failed");
                Ok(false)
            }
        }
    }

    /// Creates or truncates a file below the write target.
    pub fn open_write(&self, path: &str) -> Result<Option<FileHandle>, VfsError> {
        let Some(target) = self.write_target(path)? else {
            return Ok(None);
        };
        let opened = fs::File::create(&target).and_then(FileHandle::native);
        Ok(opened
            .inspect_err(|err| warn!(path = %target.display(), error = %err, "open_write failed"))
            .ok())
    }

    /// Opens a file below the write target for appending, creating it if
    /// needed. The cursor starts at the end.
    pub fn open_append(&self, path: &str) -> Result<Option<FileHandle>, VfsError> {
        let Some(target) = self.write_target(path)? else {
            return Ok(None);
        };
        let opened = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target)
            .and_then(FileHandle::native_at_end);
        Ok(opened
            .inspect_err(|err| warn!(path = %target.display(), error = %err, "open_append failed"))
            .ok())
    }

    /// Copies every file directly inside the virtual directory `vdir` to the
    /// host directory `dest`, creating it.
    ///
    /// # Returns
    /// The number of files written.
    pub fn copy_dir_out(&self, vdir: &str, dest: impl AsRef<Path>) -> Result<usize, VfsError> {
        let dest = dest.as_ref();
        fs::create_dir_all(dest)?;
        let mut copied = 0;
        for name in self.get_files(vdir)? {
            let Some(data) = self.load_file(&join_path(vdir, &name))? else {
                continue;
            };
            fs::write(dest.join(&name), data)?;
            copied += 1;
        }
        debug!(vdir, dest = %dest.display(), copied, "copied directory out");
        Ok(copied)
    }
}

impl Drop for VirtFs {
    fn drop(&mut self) {
        if !self.table.is_empty() {
            debug!(mounts = self.table.len(), "dropping mounted filesystem");
        }
    }
}

/// Normalized remap key; the empty remap and `/` both mean "none".
fn subdir_key(subdir: &str) -> Option<String> {
    let subdir = normalize_path(subdir);
    (!subdir.is_empty()).then(|| subdir.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtfs::test_support::{png_bytes, sorted, Fixture, PATHS_XML, TEST_TXT};
    use std::sync::Arc;

    fn contents(vfs: &VirtFs, path: &str) -> Vec<u8> {
        vfs.load_file(path).unwrap().unwrap()
    }

    #[test]
    fn prepend_makes_last_mount_win() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_dir(&fx.str("dir1"), Append::Front).unwrap();
        vfs.mount_dir(fx.root().to_str().unwrap(), false).unwrap();
        vfs.mount_dir(&fx.str("dir2"), false).unwrap();
        assert_eq!(contents(&vfs, "test.txt"), b"plain directory copy");
        assert_eq!(vfs.get_real_dir("test.txt").unwrap(), Some(fx.path("dir2")));
    }

    #[test]
    fn append_makes_first_mount_win() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_dir(fx.root().to_str().unwrap(), Append::Back).unwrap();
        vfs.mount_dir(&fx.str("dir2"), true).unwrap();
        assert_eq!(contents(&vfs, "test.txt"), TEST_TXT);
        // only the later mount has it
        assert_eq!(vfs.get_real_dir("file2.txt").unwrap(), Some(fx.path("dir2")));
    }

    #[test]
    fn zip_entry_round_trip() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_zip(&fx.str("test.zip"), Append::Back).unwrap();
        assert!(vfs.exists("dir/hide.png").unwrap());
        assert!(vfs.is_directory("dir").unwrap());
        assert!(!vfs.is_directory("dir/hide.png").unwrap());

        let mut file = vfs.open_read("dir/hide.png").unwrap().unwrap();
        assert_eq!(file.file_length(), 368);
        let mut buf = vec![0u8; 368];
        assert_eq!(file.read(&mut buf, 1, 368).unwrap(), 368);
        assert!(file.eof());
        assert_eq!(buf, png_bytes(368, 7));
        assert!(file.close());
    }

    #[test]
    fn enumeration_merges_every_mount() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_zip(&fx.str("test2.zip"), Append::Back).unwrap();
        vfs.mount_dir(fx.root().to_str().unwrap(), Append::Back).unwrap();

        let names = sorted(vfs.enumerate_files("dir2").unwrap());
        assert_eq!(
            names,
            ["file1.txt", "file2.txt", "hide.png", "paths.xml", "test.txt", "units.xml"]
        );
        // backslash and trailing separator spellings list the same directory
        assert_eq!(sorted(vfs.enumerate_files("dir2\\").unwrap()), names);
    }

    #[test]
    fn enumeration_merges_two_archives() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_zip(&fx.str("test.zip"), Append::Back).unwrap();
        vfs.mount_zip(&fx.str("test2.zip"), Append::Back).unwrap();
        assert_eq!(
            sorted(vfs.enumerate_files("dir").unwrap()),
            ["1", "brimmedhat.png", "dye.png", "gpl", "hide.png"]
        );
        assert!(vfs.enumerate_files("nothing/here").unwrap().is_empty());
    }

    #[test]
    fn unmount_restores_previous_view() {
        let fx = Fixture::new();
        let dir1 = fx.str("dir1");
        let mut vfs = VirtFs::new();
        vfs.mount_dir(&dir1, Append::Back).unwrap();
        assert!(vfs.exists("file1.txt").unwrap());

        vfs.unmount_dir(&dir1).unwrap();
        assert!(!vfs.exists("file1.txt").unwrap());
        assert!(matches!(
            vfs.unmount_dir(&dir1),
            Err(VfsError::UnmountMismatch { .. })
        ));
        // a zip unmount never matches a directory mount
        vfs.mount_dir(&dir1, Append::Back).unwrap();
        assert!(vfs.unmount_zip(&dir1).is_err());
        assert_eq!(vfs.mounts().len(), 1);
    }

    #[test]
    fn seek_then_read_second_line() {
        let fx = Fixture::new();
        for (source, zip) in [("test2.zip", true), ("", false)] {
            let mut vfs = VirtFs::new();
            if zip {
                vfs.mount_zip(&fx.str(source), Append::Back).unwrap();
            } else {
                vfs.mount_dir(fx.root().to_str().unwrap(), Append::Back).unwrap();
            }
            let mut file = vfs.open_read("test.txt").unwrap().unwrap();
            assert_eq!(file.file_length(), 23);
            file.seek(12).unwrap();
            assert_eq!(file.tell(), 12);
            assert!(!file.eof());
            let mut buf = [0u8; 11];
            assert_eq!(file.read(&mut buf, 1, 11).unwrap(), 11);
            assert_eq!(&buf, b"test line 2");
            assert!(file.eof());
        }
    }

    #[test]
    fn partial_read_is_clamped() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_zip(&fx.str("test3.zip"), Append::Back).unwrap();
        let mut file = vfs.open_read("test.txt").unwrap().unwrap();
        let mut buf = vec![0u8; 1000];
        assert_eq!(file.read(&mut buf, 1, 1000).unwrap(), 23);
        assert_eq!(&buf[..23], TEST_TXT);
        assert!(file.eof());
    }

    #[test]
    fn mixed_append_orders_by_insertion_end() {
        let fx = Fixture::new();
        let root = fx.root().to_str().unwrap().to_string();
        let test2 = fx.str("test2.zip");
        let test3 = fx.str("test3.zip");

        let mut vfs = VirtFs::new();
        vfs.mount_dir(&root, Append::Back).unwrap();
        vfs.mount_zip(&test2, Append::Front).unwrap();
        vfs.mount_zip(&test3, Append::Back).unwrap();

        let order: Vec<String> = vfs.mounts().into_iter().map(|m| m.path).collect();
        assert_eq!(order, [test2.clone(), root.clone(), test3.clone()]);

        assert_eq!(vfs.get_real_dir("test.txt").unwrap(), Some(fx.path("test2.zip")));
        vfs.unmount_zip(&test2).unwrap();
        assert_eq!(vfs.get_real_dir("test.txt").unwrap(), Some(fx.root().to_path_buf()));
        vfs.unmount_dir(&root).unwrap();
        assert_eq!(vfs.get_real_dir("test.txt").unwrap(), Some(fx.path("test3.zip")));
    }

    #[test]
    fn remapped_mounts_unmount_independently() {
        let fx = Fixture::new();
        let test2 = fx.str("test2.zip");
        let mut vfs = VirtFs::new();
        vfs.mount_zip2(&test2, "dir2", Append::Back).unwrap();
        vfs.mount_zip2(&test2, "dir", Append::Back).unwrap();
        assert!(vfs.exists("paths.xml").unwrap());
        assert!(vfs.is_directory("gpl").unwrap());
        assert!(!vfs.exists("dir2/paths.xml").unwrap());
        assert_eq!(contents(&vfs, "paths.xml"), PATHS_XML);

        assert!(matches!(
            vfs.unmount_zip(&test2),
            Err(VfsError::UnmountMismatch { .. })
        ));
        vfs.unmount_zip2(&test2, "dir").unwrap();
        assert!(!vfs.exists("gpl").unwrap());
        assert!(vfs.exists("paths.xml").unwrap());
        vfs.unmount_zip2(&test2, "/dir2/").unwrap();
        assert!(vfs.mounts().is_empty());
    }

    #[test]
    fn remapped_directory_mount() {
        let fx = Fixture::new();
        let root = fx.root().to_str().unwrap().to_string();
        let mut vfs = VirtFs::new();
        vfs.mount_dir2(&root, "dir2", Append::Back).unwrap();
        assert!(vfs.exists("file2.txt").unwrap());
        assert_eq!(vfs.get_real_dir("file2.txt").unwrap(), Some(fx.root().to_path_buf()));
        assert!(vfs.unmount_dir(&root).is_err());
        vfs.unmount_dir2(&root, "dir2").unwrap();
    }

    #[test]
    fn traversal_is_rejected_everywhere() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_dir(&fx.str("dir1"), Append::Back).unwrap();
        let bad = "../test.txt";
        assert!(matches!(vfs.exists(bad), Err(VfsError::PathTraversal(_))));
        assert!(matches!(vfs.is_directory("dir\\..\\x"), Err(VfsError::PathTraversal(_))));
        assert!(matches!(vfs.open_read(bad), Err(VfsError::PathTraversal(_))));
        assert!(matches!(vfs.enumerate_files(".."), Err(VfsError::PathTraversal(_))));
        assert!(matches!(vfs.get_real_dir(bad), Err(VfsError::PathTraversal(_))));
        assert!(matches!(vfs.mkdir("a/../../b"), Err(VfsError::PathTraversal(_))));
        assert!(matches!(vfs.exists("(unreachable)/x"), Err(VfsError::PathTraversal(_))));
        assert!(matches!(
            vfs.mount_dir2(&fx.str(""), "../..", Append::Back),
            Err(VfsError::PathTraversal(_))
        ));
    }

    #[test]
    fn misses_are_not_errors() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        assert!(!vfs.exists("test.txt").unwrap());
        assert!(vfs.open_read("test.txt").unwrap().is_none());
        vfs.mount_dir(fx.root().to_str().unwrap(), Append::Back).unwrap();
        assert!(vfs.open_read("missing.txt").unwrap().is_none());
        assert!(vfs.open_read("dir1").unwrap().is_none());
        assert!(vfs.get_real_dir("missing.txt").unwrap().is_none());
        assert!(!vfs.exists("test.txt/").unwrap());
        assert!(vfs.exists("dir1/").unwrap());
        assert!(vfs.exists("").unwrap());
    }

    #[test]
    fn trailing_separator_never_opens_a_file() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_dir(fx.root().to_str().unwrap(), Append::Back).unwrap();
        vfs.mount_zip(&fx.str("test.zip"), Append::Back).unwrap();

        assert!(!vfs.exists("test.txt/").unwrap());
        assert!(vfs.open_read("test.txt/").unwrap().is_none());
        assert!(vfs.open_read("test.txt\\").unwrap().is_none());
        assert!(!vfs.exists("dir/hide.png/").unwrap());
        assert!(vfs.open_read("dir/hide.png/").unwrap().is_none());
        assert!(vfs.load_file("dir/hide.png/").unwrap().is_none());
        assert!(vfs.open_read("dir/hide.png").unwrap().is_some());
    }

    #[test]
    fn remap_naming_a_file_does_not_mount() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        assert!(matches!(
            vfs.mount_zip2(&fx.str("test2.zip"), "test.txt", Append::Back),
            Err(VfsError::Mount { .. })
        ));
        assert!(vfs.mounts().is_empty());
    }

    #[test]
    fn mount_failures_leave_table_unchanged() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_dir(&fx.str("dir1"), Append::Back).unwrap();

        assert!(matches!(vfs.mount_dir(&fx.str("missing"), true), Err(VfsError::Mount { .. })));
        assert!(matches!(vfs.mount_dir(&fx.str("test.txt"), true), Err(VfsError::Mount { .. })));
        assert!(matches!(vfs.mount_zip(&fx.str("test.txt"), true), Err(VfsError::Mount { .. })));
        assert!(matches!(vfs.mount_zip(&fx.str("missing.zip"), true), Err(VfsError::Mount { .. })));
        assert!(matches!(vfs.mount_zip2(&fx.str("test.zip"), "nope", true), Err(VfsError::Mount { .. })));
        assert_eq!(vfs.mounts().len(), 1);
    }

    #[test]
    fn duplicate_mount_rejected_after_normalization() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_dir(&fx.str("dir1"), Append::Back).unwrap();
        let respelled = format!("{}//", fx.str("dir1"));
        assert!(matches!(vfs.mount_dir(&respelled, Append::Front), Err(VfsError::Mount { .. })));
        assert_eq!(vfs.mounts().len(), 1);
        vfs.unmount_dir(&respelled).unwrap();
    }

    #[test]
    fn size_limit_refuses_large_archives() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.set_max_archive_size(Some(64));
        assert!(vfs.mount_zip(&fx.str("test.zip"), Append::Back).is_err());
        vfs.set_max_archive_size(None);
        vfs.mount_zip(&fx.str("test.zip"), Append::Back).unwrap();
    }

    #[test]
    fn mount_detects_kind() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount(&fx.str("test.zip"), Append::Back).unwrap();
        vfs.mount(&fx.str("dir1"), Append::Back).unwrap();
        let kinds: Vec<BackendKind> = vfs.mounts().into_iter().map(|m| m.kind).collect();
        assert_eq!(kinds, [BackendKind::Zip, BackendKind::Directory]);
    }

    #[test]
    fn file_and_dir_listings() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_dir(fx.root().to_str().unwrap(), Append::Back).unwrap();
        vfs.mount_zip(&fx.str("test2.zip"), Append::Back).unwrap();

        assert_eq!(sorted(vfs.get_dirs("").unwrap()), ["dir", "dir1", "dir2"]);
        assert_eq!(
            sorted(vfs.get_files("").unwrap()),
            ["test.txt", "test.zip", "test2.zip", "test3.zip", "units.xml"]
        );
        assert_eq!(
            sorted(vfs.get_files_with_dir("dir/").unwrap()),
            ["dir/dye.png", "dir/hide.png"]
        );
        let zips = FilterSet::extension("zip").unwrap();
        assert_eq!(
            sorted(vfs.get_files_in_dir("", &zips).unwrap()),
            ["test.zip", "test2.zip", "test3.zip"]
        );
    }

    #[test]
    fn load_helpers() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_zip(&fx.str("test2.zip"), Append::Back).unwrap();
        assert_eq!(
            vfs.load_text_lines("test.txt").unwrap().unwrap(),
            ["test line 1", "test line 2"]
        );
        assert_eq!(contents(&vfs, "dir/dye.png"), png_bytes(794, 11));
        assert!(vfs.load_file("nope.txt").unwrap().is_none());
    }

    #[test]
    fn archive_search_mounts_and_unmounts() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_dir(fx.root().to_str().unwrap(), Append::Back).unwrap();
        let zips = FilterSet::extension("zip").unwrap();

        assert_eq!(vfs.search_and_add_archives("/", &zips, Append::Back).unwrap(), 3);
        assert!(vfs.exists("dir/hide.png").unwrap());
        assert!(vfs.exists("dir/gpl/palette.gpl").unwrap());
        assert_eq!(vfs.mounts().len(), 4);
        // already mounted archives are skipped
        assert_eq!(vfs.search_and_add_archives("", &zips, Append::Back).unwrap(), 0);

        assert_eq!(vfs.search_and_remove_archives("", &zips).unwrap(), 3);
        assert!(!vfs.exists("dir/hide.png").unwrap());
        assert_eq!(vfs.mounts().len(), 1);
    }

    #[test]
    fn writes_go_to_write_dir() {
        let fx = Fixture::new();
        let out = tempfile::tempdir().unwrap();
        let mut vfs = VirtFs::new();
        vfs.mount_zip(&fx.str("test.zip"), Append::Back).unwrap();

        // zip mounts are never writable
        assert!(!vfs.mkdir("logs").unwrap());
        assert!(vfs.open_write("logs/a.txt").unwrap().is_none());

        vfs.set_write_dir(out.path());
        assert!(vfs.mkdir("logs/today").unwrap());
        assert!(out.path().join("logs/today").is_dir());
        assert!(vfs.mkdir("logs/today").unwrap());

        let mut file = vfs.open_write("logs/today/a.txt").unwrap().unwrap();
        assert_eq!(file.write(b"first", 1, 5).unwrap(), 5);
        drop(file);
        let mut file = vfs.open_append("logs/today/a.txt").unwrap().unwrap();
        assert_eq!(file.tell(), 5);
        assert_eq!(file.write(b" second", 7, 1).unwrap(), 1);
        drop(file);
        assert_eq!(
            fs::read_to_string(out.path().join("logs/today/a.txt")).unwrap(),
            "first second"
        );

        assert!(vfs.remove("logs/today/a.txt").unwrap());
        assert!(vfs.remove("logs/today").unwrap());
        assert!(!vfs.remove("logs/today").unwrap());
    }

    #[test]
    fn writes_fall_back_to_first_directory_mount() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_zip(&fx.str("test2.zip"), Append::Back).unwrap();
        vfs.mount_dir(&fx.str("dir1"), Append::Back).unwrap();
        assert!(vfs.mkdir("made").unwrap());
        assert!(fx.path("dir1/made").is_dir());
        assert!(vfs.is_directory("made").unwrap());
    }

    #[test]
    fn copy_dir_out_extracts_files() {
        let fx = Fixture::new();
        let out = tempfile::tempdir().unwrap();
        let mut vfs = VirtFs::new();
        vfs.mount_zip(&fx.str("test2.zip"), Append::Back).unwrap();

        let dest = out.path().join("dir2");
        assert_eq!(vfs.copy_dir_out("dir2", &dest).unwrap(), 4);
        assert_eq!(fs::read(dest.join("paths.xml")).unwrap(), PATHS_XML);
        assert_eq!(fs::read(dest.join("test.txt")).unwrap(), TEST_TXT);
    }

    #[cfg(unix)]
    #[test]
    fn symbolic_links_need_permission() {
        let fx = Fixture::new();
        std::os::unix::fs::symlink(fx.path("test.txt"), fx.path("dir1/link.txt")).unwrap();
        let mut vfs = VirtFs::new();
        vfs.mount_dir(&fx.str("dir1"), Append::Back).unwrap();

        assert!(!vfs.is_symbolic_link("link.txt").unwrap());
        assert_eq!(vfs.enumerate_files("").unwrap(), ["file1.txt"]);

        vfs.permit_links(true);
        assert!(vfs.is_symbolic_link("link.txt").unwrap());
        assert!(!vfs.is_symbolic_link("file1.txt").unwrap());
        assert_eq!(sorted(vfs.enumerate_files("").unwrap()), ["file1.txt", "link.txt"]);
    }

    #[test]
    fn deinit_unmounts_everything() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_dir(&fx.str("dir1"), Append::Back).unwrap();
        vfs.mount_zip(&fx.str("test.zip"), Append::Back).unwrap();
        vfs.set_write_dir(fx.root());
        vfs.deinit();
        assert!(vfs.mounts().is_empty());
        assert!(vfs.write_dir().is_none());
        assert!(!vfs.exists("file1.txt").unwrap());
    }

    #[test]
    fn concurrent_lookups() {
        let fx = Fixture::new();
        let mut vfs = VirtFs::new();
        vfs.mount_zip(&fx.str("test.zip"), Append::Back).unwrap();
        vfs.mount_dir(fx.root().to_str().unwrap(), Append::Back).unwrap();
        let vfs = Arc::new(vfs);

        std::thread::scope(|s| {
            for _ in 0..4 {
                let vfs = Arc::clone(&vfs);
                s.spawn(move || {
                    for _ in 0..10 {
                        assert_eq!(contents(&vfs, "dir/hide.png").len(), 368);
                        assert!(vfs.exists("units.xml").unwrap());
                    }
                });
            }
        });
    }
}
