//! Ordered list of mounted sources.
//!
//! The front of the table has the highest precedence: lookups walk it front
//! to back and stop at the first backend that answers.

use super::backend::{Backend, BackendKind};
use super::VfsError;
use std::collections::VecDeque;

/// Where a new mount is inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Append {
    /// Insert at the front: the new mount shadows every existing one.
    Front,
    /// Insert at the back: the new mount is consulted last.
    #[default]
    Back,
}

impl From<bool> for Append {
    /// `true` appends, `false` prepends.
    fn from(append: bool) -> Self {
        if append { Append::Back } else { Append::Front }
    }
}

/// One mounted source.
#[derive(Debug)]
pub struct MountEntry {
    /// Host path as given to the mount call, normalized.
    pub original_path: String,
    pub kind: BackendKind,
    /// Remap inside the source, normalized. `None` exposes the whole source.
    pub subdir: Option<String>,
    pub backend: Box<dyn Backend>,
}

impl MountEntry {
    fn matches(&self, path: &str, kind: BackendKind, subdir: Option<&str>) -> bool {
        self.kind == kind && self.original_path == path && self.subdir.as_deref() == subdir
    }

    pub fn info(&self) -> MountInfo {
        MountInfo {
            path: self.original_path.clone(),
            kind: self.kind,
            subdir: self.subdir.clone(),
        }
    }
}

/// Public description of a mount, without its backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub path: String,
    pub kind: BackendKind,
    pub subdir: Option<String>,
}

#[derive(Debug, Default)]
pub struct MountTable {
    entries: VecDeque<MountEntry>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a mount at the front or back of the table.
    ///
    /// # Errors
    /// Returns `VfsError::Mount` if a mount with the same path, kind and
    /// subdir is already present; the table is left unchanged.
    pub fn insert(&mut self, entry: MountEntry, append: Append) -> Result<(), VfsError> {
        if self.find(&entry.original_path, entry.kind, entry.subdir.as_deref()).is_some() {
            return Err(VfsError::mount(entry.original_path, "already mounted"));
        }
        match append {
            Append::Front => self.entries.push_front(entry),
            Append::Back => self.entries.push_back(entry),
        }
        Ok(())
    }

    /// Removes the mount matching `(path, kind, subdir)` exactly and returns it.
    ///
    /// # Errors
    /// Returns `VfsError::UnmountMismatch` if there is no such mount.
    pub fn remove(
        &mut self,
        path: &str,
        kind: BackendKind,
        subdir: Option<&str>,
    ) -> Result<MountEntry, VfsError> {
        self.entries
            .iter()
            .position(|e| e.matches(path, kind, subdir))
            .and_then(|pos| self.entries.remove(pos))
            .ok_or_else(|| VfsError::UnmountMismatch {
                path: path.to_string(),
                subdir: subdir.map(str::to_string),
            })
    }

    pub fn find(&self, path: &str, kind: BackendKind, subdir: Option<&str>) -> Option<&MountEntry> {
        self.entries.iter().find(|e| e.matches(path, kind, subdir))
    }

    /// First entry, front to back, whose backend satisfies `pred`.
    pub fn find_first<P>(&self, mut pred: P) -> Option<&MountEntry>
    where
        P: FnMut(&dyn Backend) -> bool,
    {
        self.entries.iter().find(|e| pred(e.backend.as_ref()))
    }

    /// First `Some` produced by `f`, front to back.
    pub fn find_map_first<T, F>(&self, f: F) -> Option<T>
    where
        F: FnMut(&MountEntry) -> Option<T>,
    {
        self.entries.iter().find_map(f)
    }

    /// Every entry whose backend satisfies `pred`, in precedence order.
    pub fn find_all<P>(&self, mut pred: P) -> Vec<&MountEntry>
    where
        P: FnMut(&dyn Backend) -> bool,
    {
        self.entries.iter().filter(|e| pred(e.backend.as_ref())).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MountEntry> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every mount.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn infos(&self) -> Vec<MountInfo> {
        self.entries.iter().map(MountEntry::info).collect()
    }
}
