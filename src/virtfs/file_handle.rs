use super::backend::BackendKind;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

// ---------------------------------------------------------------------------
// FileHandle – one open file, native or decompressed into memory
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Storage {
    /// A host file opened through a directory mount.
    Native(File),
    /// The fully decompressed contents of an archive entry.
    Memory(Vec<u8>),
}

/// An open file returned by [`VirtFs::open_read`](super::VirtFs::open_read).
///
/// Directory mounts hand out a native file; zip mounts hand out an owned,
/// already decompressed buffer. Both expose the same element-oriented
/// `read`/`seek`/`tell`/`eof` surface and also implement [`Read`] and [`Seek`].
///
/// The cursor may be moved past the end with [`seek`](Self::seek); reads then
/// return nothing and [`eof`](Self::eof) reports `true`.
#[derive(Debug)]
pub struct FileHandle {
    kind: BackendKind,
    storage: Option<Storage>,
    cursor: u64,
    length: u64,
}

impl FileHandle {
    pub(crate) fn native(file: File) -> io::Result<Self> {
        let length = file.metadata()?.len();
        Ok(Self {
            kind: BackendKind::Directory,
            storage: Some(Storage::Native(file)),
            cursor: 0,
            length,
        })
    }

    /// Wraps a native file opened for appending; the cursor starts at the end.
    ///
    /// A [`seek`](Self::seek) on such a handle only affects reads: every
    /// write still lands at the end of the file and moves the cursor there.
    pub(crate) fn native_at_end(mut file: File) -> io::Result<Self> {
        let length = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            kind: BackendKind::Directory,
            storage: Some(Storage::Native(file)),
            cursor: length,
            length,
        })
    }

    pub(crate) fn memory(buf: Vec<u8>) -> Self {
        Self {
            kind: BackendKind::Zip,
            length: buf.len() as u64,
            storage: Some(Storage::Memory(buf)),
            cursor: 0,
        }
    }

    /// The kind of mount this handle was opened from.
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Reads up to `count` elements of `element_size` bytes into `dst`.
    ///
    /// Only whole elements are copied, and never more than `dst` can hold or
    /// than remain before the end of the file.
    ///
    /// # Returns
    /// The number of elements read. `0` at or past the end of the file, or
    /// when `element_size` or `count` is zero.
    ///
    /// # Errors
    /// Fails if the handle was closed or the host read fails.
    pub fn read(&mut self, dst: &mut [u8], element_size: usize, count: usize) -> io::Result<usize> {
        let remaining = self.length.saturating_sub(self.cursor);
        let storage = self.storage.as_mut().ok_or_else(closed)?;
        if element_size == 0 || count == 0 || remaining == 0 {
            return Ok(0);
        }

        let wanted = count.saturating_mul(element_size).min(dst.len());
        let wanted = usize::try_from(remaining).map_or(wanted, |r| wanted.min(r));
        let items = wanted / element_size;
        let bytes = items * element_size;
        if bytes == 0 {
            return Ok(0);
        }

        match storage {
            Storage::Memory(buf) => {
                let start = self.cursor as usize;
                dst[..bytes].copy_from_slice(&buf[start..start + bytes]);
            }
            Storage::Native(file) => file.read_exact(&mut dst[..bytes])?,
        }
        self.cursor += bytes as u64;
        Ok(items)
    }

    /// Writes up to `count` elements of `element_size` bytes from `src`.
    ///
    /// # Errors
    /// Handles opened from an archive are read-only and always fail with
    /// `ErrorKind::Unsupported`.
    pub fn write(&mut self, src: &[u8], element_size: usize, count: usize) -> io::Result<usize> {
        let storage = self.storage.as_mut().ok_or_else(closed)?;
        let file = match storage {
            Storage::Native(file) => file,
            Storage::Memory(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "archive entries are read-only",
                ));
            }
        };
        if element_size == 0 || count == 0 {
            return Ok(0);
        }

        let items = count.saturating_mul(element_size).min(src.len()) / element_size;
        let bytes = items * element_size;
        file.write_all(&src[..bytes])?;
        // append-mode files always write at the end, whatever the last seek
        self.cursor = file.stream_position()?;
        self.length = self.length.max(self.cursor);
        Ok(items)
    }

    /// Moves the cursor to an absolute byte offset.
    ///
    /// Offsets past the end are accepted and not clamped.
    pub fn seek(&mut self, pos: u64) -> io::Result<()> {
        match self.storage.as_mut().ok_or_else(closed)? {
            Storage::Native(file) => {
                file.seek(SeekFrom::Start(pos))?;
            }
            Storage::Memory(_) => {}
        }
        self.cursor = pos;
        Ok(())
    }

    pub fn tell(&self) -> u64 {
        self.cursor
    }

    pub fn eof(&self) -> bool {
        self.cursor >= self.length
    }

    pub fn file_length(&self) -> u64 {
        self.length
    }

    pub fn is_closed(&self) -> bool {
        self.storage.is_none()
    }

    /// Releases the underlying file or buffer.
    ///
    /// Returns `true` if this call released it and `false` if the handle was
    /// already closed.
    pub fn close(&mut self) -> bool {
        self.storage.take().is_some()
    }
}

fn closed() -> io::Error {
    io::Error::other("file handle is closed")
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len();
        FileHandle::read(self, buf, 1, len)
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(d) => self.length.checked_add_signed(d),
            SeekFrom::Current(d) => self.cursor.checked_add_signed(d),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        FileHandle::seek(self, target)?;
        Ok(target)
    }
}
