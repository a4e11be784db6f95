use super::backend::{Backend, BackendKind, DirEntry, LinkPolicy};
use super::file_handle::FileHandle;
use super::path_utils::{base_name, is_safe_path, normalize_path, parent_dir, VfsPath};
use super::VfsError;
use rustc_hash::{FxHashMap, FxHashSet};
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, trace};
use zip::{CompressionMethod, ZipArchive};

// ---------------------------------------------------------------------------
// ZipIndex – read-only table of archive entries, built once at mount time
// ---------------------------------------------------------------------------

/// Location and size data for one archive entry, taken from the central
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntryInfo {
    /// Position of the entry in the central directory.
    pub index: usize,
    /// Byte offset of the entry's local file header.
    pub header_offset: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression: CompressionMethod,
    pub crc32: u32,
}

/// Index of every file and directory in a mounted archive.
///
/// Keys are normalized (forward slashes, no leading or trailing slash) and,
/// for remapped mounts, already have the remap prefix stripped. Directories
/// are both the explicit `name/` entries of the archive and every parent
/// implied by a file path.
#[derive(Debug, Default)]
pub struct ZipIndex {
    /// File storage: normalized path → entry location.
    files: FxHashMap<Arc<str>, ZipEntryInfo>,
    /// File paths in central-directory order.
    order: Vec<Arc<str>>,
    /// Every known directory, explicit or implied.
    dirs: FxHashSet<Arc<str>>,
    /// Directory index: normalized directory path → its immediate children.
    dir_index: FxHashMap<Arc<str>, Vec<DirEntry>>,
    /// Cache for directory strings to avoid repeated allocations.
    parent_cache: FxHashMap<String, Arc<str>>,
}

impl ZipIndex {
    /// Number of file entries.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty() && self.dirs.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&ZipEntryInfo> {
        self.files.get(path)
    }

    pub fn contains_dir(&self, path: &str) -> bool {
        self.dirs.contains(path)
    }

    /// File entries in central-directory order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &ZipEntryInfo)> + '_ {
        self.order
            .iter()
            .filter_map(|name| self.files.get(name).map(|info| (name.as_ref(), info)))
    }

    /// Immediate children of `dir`; the root is the empty string.
    pub fn children(&self, dir: &str) -> &[DirEntry] {
        self.dir_index.get(dir).map(Vec::as_slice).unwrap_or_default()
    }

    /// Builds the index from the central directory of `archive`.
    ///
    /// Entries with unsafe names are skipped. With a `prefix`, only entries
    /// below that directory are kept and the prefix is removed from their
    /// names.
    ///
    /// # Returns
    /// The index, and whether any entry lay under `prefix` (always `true`
    /// without a prefix).
    fn build<R: Read + Seek>(archive: &mut ZipArchive<R>, prefix: Option<&str>) -> (Self, bool) {
        let mut index = ZipIndex {
            files: FxHashMap::with_capacity_and_hasher(archive.len(), Default::default()),
            order: Vec::with_capacity(archive.len()),
            dirs: FxHashSet::default(),
            dir_index: FxHashMap::with_capacity_and_hasher(archive.len() / 5, Default::default()),
            parent_cache: FxHashMap::with_capacity_and_hasher(64, Default::default()),
        };
        let mut matched = prefix.is_none();

        for i in 0..archive.len() {
            // Silently skip corrupted entries.
            let file = match archive.by_index_raw(i) {
                Ok(f) => f,
                Err(err) => {
                    debug!(index = i, error = %err, "skipping unreadable zip entry");
                    continue;
                }
            };

            let name = normalize_path(file.name());
            if name.is_empty() || !is_safe_path(&name) {
                continue;
            }
            let visible = match prefix {
                Some(prefix) => match strip_dir_prefix(&name, prefix) {
                    Some(rest) => rest,
                    None => continue,
                },
                None => name.as_ref(),
            };
            // a remap naming a file entry exposes nothing
            if visible.is_empty() && !file.is_dir() {
                continue;
            }
            matched = true;

            if file.is_dir() {
                index.insert_dir(visible);
                continue;
            }

            let info = ZipEntryInfo {
                index: i,
                header_offset: file.header_start(),
                compressed_size: file.compressed_size(),
                uncompressed_size: file.size(),
                compression: file.compression(),
                crc32: file.crc32(),
            };
            debug!(
                name = visible,
                method = %info.compression,
                compressed = info.compressed_size,
                uncompressed = info.uncompressed_size,
                "indexed zip entry"
            );
            index.insert_file(Arc::from(visible), info);
        }

        (index, matched)
    }

    /// Records a file and registers it, plus every implied parent directory,
    /// in the directory index. The first entry with a given name wins.
    fn insert_file(&mut self, path: Arc<str>, info: ZipEntryInfo) {
        if self.files.contains_key(&path) {
            debug!(name = %path, "duplicate zip entry ignored");
            return;
        }
        self.files.insert(path.clone(), info);
        self.order.push(path.clone());

        let parent = parent_dir(&path);
        self.add_child(parent, DirEntry::file(base_name(&path)));
        self.register_dirs(parent);
    }

    fn insert_dir(&mut self, path: &str) {
        self.register_dirs(path);
    }

    /// Marks `dir` and its ancestors as directories, stopping at the first
    /// one already known.
    fn register_dirs(&mut self, mut dir: &str) {
        while !dir.is_empty() && !self.dirs.contains(dir) {
            let key = self.intern(dir);
            self.dirs.insert(key);
            let parent = parent_dir(dir);
            self.add_child(parent, DirEntry::dir(base_name(dir)));
            dir = parent;
        }
    }

    #[inline]
    fn add_child(&mut self, parent: &str, entry: DirEntry) {
        let key = self.intern(parent);
        self.dir_index.entry(key).or_default().push(entry);
    }

    #[inline]
    fn intern(&mut self, dir: &str) -> Arc<str> {
        self.parent_cache
            .entry(dir.to_string())
            .or_insert_with(|| Arc::from(dir))
            .clone()
    }
}

/// Strips the directory `prefix` from `name` on a segment boundary.
fn strip_dir_prefix<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = name.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

// ---------------------------------------------------------------------------
// ZipBackend – a mounted archive
// ---------------------------------------------------------------------------

/// A mounted zip archive.
///
/// The central directory is parsed once when the archive is mounted; after
/// that the [`ZipIndex`] is read-only and answers every lookup without
/// touching the file. Opening an entry decompresses it completely into a
/// buffer owned by the returned [`FileHandle`]; two opens of the same entry
/// get independent copies.
///
/// # Example
/// ```no_run
/// # use virtfs_overlay::{Backend, ZipBackend, validate_path};
/// # fn main() -> Result<(), virtfs_overlay::VfsError> {
/// let zip = ZipBackend::open("data/test/test2.zip", Some("dir2"), Some(100_000_000))?;
/// assert!(zip.exists(&validate_path("paths.xml")?));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ZipBackend {
    archive_path: PathBuf,
    index: ZipIndex,
    /// `ZipArchive` needs `&mut` to read entries.
    archive: Mutex<ZipArchive<File>>,
}

impl ZipBackend {
    /// Opens and indexes an archive.
    ///
    /// # Arguments
    /// * `path` – the archive file on the host.
    /// * `subdir` – optional directory inside the archive to expose as the
    ///   mount root. `None`, `""` and `"/"` all expose the whole archive.
    /// * `max_archive_size` – optional maximum allowed archive size in bytes.
    ///
    /// # Errors
    /// Returns `VfsError::Mount` if the file cannot be opened, is larger than
    /// the limit, has no end-of-central-directory record, or contains nothing
    /// under `subdir`.
    pub fn open(
        path: impl Into<PathBuf>,
        subdir: Option<&str>,
        max_archive_size: Option<u64>,
    ) -> Result<Self, VfsError> {
        let archive_path = path.into();
        Self::load(&archive_path, subdir, max_archive_size)
            .map_err(|err| VfsError::mount(archive_path.display().to_string(), err.to_string()))
    }

    fn load(
        archive_path: &Path,
        subdir: Option<&str>,
        max_archive_size: Option<u64>,
    ) -> Result<Self, VfsError> {
        let file = File::open(archive_path)?;
        let file = Self::check_archive_size(file, max_archive_size)?;
        let mut archive = ZipArchive::new(file)?;

        let prefix = subdir.map(normalize_path).filter(|p| !p.is_empty());
        let (index, matched) = ZipIndex::build(&mut archive, prefix.as_deref());
        if !matched {
            return Err(VfsError::NotFound(format!(
                "subdir {} in archive",
                prefix.as_deref().unwrap_or_default()
            )));
        }
        debug!(
            archive = %archive_path.display(),
            files = index.len(),
            dirs = index.dirs.len(),
            "read archive"
        );

        Ok(Self {
            archive_path: archive_path.to_path_buf(),
            index,
            archive: Mutex::new(archive),
        })
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// The read-only entry index built at mount time.
    pub fn index(&self) -> &ZipIndex {
        &self.index
    }

    /// Decompresses one entry fully into memory.
    ///
    /// The `zip` crate verifies the entry's CRC-32 once it has been read to
    /// the end; a mismatch, a short read or an unsupported compression method
    /// is reported as `VfsError::CorruptArchive`.
    fn read_entry(&self, name: &str, info: &ZipEntryInfo) -> Result<Vec<u8>, VfsError> {
        let corrupt = |reason: String| VfsError::CorruptArchive {
            archive: self.archive_path.display().to_string(),
            entry: name.to_string(),
            reason,
        };

        let mut archive = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = archive
            .by_index(info.index)
            .map_err(|err| corrupt(err.to_string()))?;

        let size = usize::try_from(file.size())
            .map_err(|_| corrupt(format!("entry size {} does not fit in memory", file.size())))?;
        let mut content = Vec::new();
        content
            .try_reserve_exact(size)
            .map_err(|err| corrupt(err.to_string()))?;
        file.read_to_end(&mut content)
            .map_err(|err| corrupt(err.to_string()))?;

        if content.len() as u64 != info.uncompressed_size {
            return Err(corrupt(format!(
                "expected {} bytes, got {}",
                info.uncompressed_size,
                content.len()
            )));
        }
        Ok(content)
    }

    /// Checks whether the archive size exceeds the optional limit.
    ///
    /// If a limit is provided, the reader is seeked to the end to obtain the
    /// total size. After the check, the reader is rewound to the beginning
    /// so that it can be used to construct the ZIP archive.
    ///
    /// # Errors
    /// Returns `VfsError::ArchiveTooLarge` if the size exceeds the limit,
    /// or `VfsError::Io` if seeking fails.
    fn check_archive_size<R: Read + Seek>(
        mut reader: R,
        max_archive_size: Option<u64>,
    ) -> Result<R, VfsError> {
        if let Some(limit) = max_archive_size {
            let size = reader.seek(SeekFrom::End(0))?;
            if size > limit { return Err(VfsError::ArchiveTooLarge(size, limit)); }
        }

        reader.seek(SeekFrom::Start(0))?;
        Ok(reader)
    }
}

impl Backend for ZipBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Zip
    }

    fn exists(&self, path: &VfsPath) -> bool {
        let key = path.as_str();
        (!path.has_dir_hint() && self.index.files.contains_key(key)) || self.index.dirs.contains(key)
    }

    fn is_directory(&self, path: &VfsPath) -> bool {
        let key = path.as_str();
        !key.is_empty() && self.index.dirs.contains(key) && !self.index.files.contains_key(key)
    }

    fn open_read(&self, path: &VfsPath) -> Result<FileHandle, VfsError> {
        // `name.ext/` never names a file
        let info = (!path.has_dir_hint())
            .then(|| self.index.get(path.as_str()))
            .flatten()
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        trace!(archive = %self.archive_path.display(), entry = %path, "inflate zip entry");
        let content = self.read_entry(path.as_str(), info)?;
        Ok(FileHandle::memory(content))
    }

    fn list(&self, dir: &VfsPath, _links: LinkPolicy) -> Vec<DirEntry> {
        self.index.children(dir.as_str()).to_vec()
    }

    fn real_dir(&self, path: &VfsPath) -> Option<PathBuf> {
        self.exists(path).then(|| self.archive_path.clone())
    }
}
