use super::VfsError;
use std::borrow::Cow;
use std::fmt;

/// Marker some platform `realpath` implementations emit for symlink targets
/// that cannot be reached.
const UNREACHABLE_MARKER: &str = "(unreachable)";

/// Checks whether a user supplied path is safe to resolve against a mount.
///
/// A path is rejected if it contains a parent-directory step in any separator
/// convention (`../`, `..\`, `/..`, `\..`), is exactly `..`, or contains the
/// `(unreachable)` marker.
///
/// # Arguments
///
/// * `path` - The raw path string to check, before normalization.
///
/// # Returns
///
/// `true` if the path is safe, `false` otherwise.
#[inline]
pub fn is_safe_path(path: &str) -> bool {
    path != ".."
        && !path.contains("../")
        && !path.contains("..\\")
        && !path.contains("/..")
        && !path.contains("\\..")
        && !path.contains(UNREACHABLE_MARKER)
}

/// Normalizes a logical path into its lookup key.
///
/// This function:
/// - Converts all `\` (backslash) characters into `/` (forward slash).
/// - Collapses runs of `/` into a single separator.
/// - Removes the leading and trailing `/`.
///
/// `.` and `..` segments are left alone; unsafe paths are rejected separately
/// by [`is_safe_path`]. The result is returned as a `Cow<str>` to avoid
/// unnecessary allocations when no changes are needed.
///
/// # Arguments
///
/// * `path` - The raw path string to normalize.
///
/// # Returns
///
/// A normalized path, possibly borrowed or owned.
#[inline]
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    let clean = !path.contains('\\')
        && !path.contains("//")
        && !path.starts_with('/')
        && !path.ends_with('/');
    if clean {
        return path.into();
    }

    let mut out = String::with_capacity(path.len());
    for segment in path.split(['/', '\\']).filter(|s| !s.is_empty()) {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    out.into()
}

/// Normalizes a host filesystem path used as a mount key.
///
/// Unlike [`normalize_path`] the leading `/` of an absolute path is kept, so
/// the result can still be opened on the host. Separators are unified to `/`,
/// repeated separators are collapsed and a trailing separator is dropped.
pub fn normalize_real_path(path: &str) -> String {
    let absolute = path.starts_with('/') || path.starts_with('\\');
    let body = normalize_path(path);
    if absolute {
        format!("/{body}")
    } else {
        body.into_owned()
    }
}

/// Validates and normalizes a logical path.
///
/// The raw input is checked with [`is_safe_path`] first, so traversal attempts
/// are caught in whatever separator convention they were written. The empty
/// path is valid and names the root of every mount.
///
/// # Errors
///
/// Returns `VfsError::PathTraversal` if the path is unsafe.
#[inline]
pub fn validate_path(path: &str) -> Result<VfsPath, VfsError> {
    if !is_safe_path(path) {
        return Err(VfsError::PathTraversal(path.to_string()));
    }
    Ok(VfsPath {
        key: normalize_path(path).into_owned(),
        dir_hint: path.ends_with('/') || path.ends_with('\\'),
    })
}

/// Returns the parent directory of a given path.
///
/// This function extracts the portion of the path before the last `/`
/// separator. If there is no separator, it returns an empty string.
///
/// # Arguments
///
/// * `path` - A normalized path string.
///
/// # Returns
///
/// The parent directory path, or an empty string if there is no parent.
#[inline]
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |pos| &path[..pos])
}

/// Returns the last segment of a normalized path.
#[inline]
pub(crate) fn base_name(path: &str) -> &str {
    path.rfind('/').map_or(path, |pos| &path[pos + 1..])
}

/// Joins two logical paths with a single `/`.
///
/// Either side may be empty, in which case the other is returned normalized.
pub fn join_path(base: &str, name: &str) -> String {
    let base = normalize_path(base);
    let name = normalize_path(name);
    match (base.is_empty(), name.is_empty()) {
        (true, _) => name.into_owned(),
        (_, true) => base.into_owned(),
        _ => format!("{base}/{name}"),
    }
}

/// A validated, normalized logical path.
///
/// Produced by [`validate_path`]. Besides the lookup key it remembers whether
/// the caller wrote a trailing separator, since a path like `dir/file.txt/`
/// must not be reported as an existing file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VfsPath {
    key: String,
    dir_hint: bool,
}

impl VfsPath {
    /// The root of the namespace.
    pub fn root() -> Self {
        Self::default()
    }

    /// The normalized lookup key (no leading or trailing `/`).
    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn is_root(&self) -> bool {
        self.key.is_empty()
    }

    /// `true` if the caller's path ended with a separator.
    pub fn has_dir_hint(&self) -> bool {
        self.dir_hint
    }

    /// Appends a child segment. The result carries no directory hint.
    pub fn join(&self, name: &str) -> VfsPath {
        VfsPath {
            key: join_path(&self.key, name),
            dir_hint: false,
        }
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
