use std::sync::Arc;
use rustc_hash::FxHashSet;
use super::path_utils::validate_path;
use super::VfsError;

/// A set of filters that can match entry names either exactly or by glob pattern.
///
/// Used to pick entries out of a directory listing, for example to find every
/// `*.zip` update archive in a directory before mounting them. Filters are
/// added in a builder‑style fashion; each addition validates and normalizes
/// the input name or pattern.
///
/// # Example
/// ```
/// # use virtfs_overlay::FilterSet;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let filter = FilterSet::new()
///     .add_exact("paths.xml")?
///     .add_glob("*.zip")?;
///
/// assert!( filter.matches_str("paths.xml"));
/// assert!( filter.matches_str("update-1.zip"));
/// assert!(!filter.matches_str("units.xml"));
/// # Ok(())
/// # }
/// ```
///
/// If no filters are added, the set is considered empty and `matches_str` will
/// always return `false` (i.e., nothing matches). Use [`FilterSet::any`] for a
/// set that matches everything.
#[derive(Debug, Default, Clone)]
pub struct FilterSet {
    /// Exact names that must be matched. Stored as reference‑counted strings
    /// to reduce cloning overhead when checking many names.
    exact: FxHashSet<Arc<str>>,
    /// Glob patterns, in the order they were added. They are evaluated in sequence
    /// using `fast_glob::glob_match`.
    globs: Vec<String>
}

impl FilterSet {
    /// Creates an empty filter set.
    ///
    /// Equivalent to `FilterSet::default()`.
    pub fn new() -> Self { Self::default() }

    /// Creates a filter set that matches every name.
    pub fn any() -> Self {
        Self { exact: FxHashSet::default(), globs: vec!["*".to_string()] }
    }

    /// Creates a filter set matching names that end in `.ext`.
    ///
    /// A leading dot in `ext` is accepted and ignored, so `"zip"` and `".zip"`
    /// build the same filter.
    ///
    /// # Errors
    /// Returns `VfsError::InvalidPattern` if the extension is empty or unsafe.
    pub fn extension(ext: &str) -> Result<Self, VfsError> {
        let ext = ext.trim_start_matches('.');
        if ext.is_empty() {
            return Err(VfsError::InvalidPattern("empty extension".into()));
        }
        Self::new().add_glob(&format!("*.{ext}"))
    }

    /// Adds an exact name to the filter set.
    ///
    /// The name is first validated and normalized by [`validate_path`], which
    /// ensures it does not contain directory‑traversal components and has a
    /// consistent format (e.g., leading slashes removed).
    ///
    /// # Arguments
    /// * `name` – The exact name to match (e.g., `"paths.xml"`).
    ///
    /// # Errors
    /// Returns `VfsError::InvalidPattern` if the name is empty, contains `".."`,
    /// or is otherwise invalid according to [`validate_path`].
    pub fn add_exact(mut self, name: &str) -> Result<Self, VfsError> {
        let normalized = Self::validate(name)?;
        self.exact.insert(Arc::from(normalized));
        Ok(self)
    }

    /// Adds a glob pattern to the filter set.
    ///
    /// The pattern is validated and normalized in the same way as exact names
    /// (see [`add_exact`](Self::add_exact)). Matching is performed with the
    /// [`fast_glob::glob_match`] function, which supports the usual `*` and `?`
    /// wildcards.
    ///
    /// # Errors
    /// Returns `VfsError::InvalidPattern` if the pattern is empty, contains `".."`,
    /// or is otherwise invalid.
    pub fn add_glob(mut self, pattern: &str) -> Result<Self, VfsError> {
        let normalized = Self::validate(pattern)?;
        self.globs.push(normalized);
        Ok(self)
    }

    /// Checks whether the given name matches any of the filters in the set.
    ///
    /// The check is performed in two steps:
    /// 1. Exact match against the set of exact names (O(1) average).
    /// 2. If no exact match is found, each glob pattern is tested in order.
    #[inline]
    pub fn matches_str(&self, name: &str) -> bool {
        if self.exact.contains(name) { return true; }
        self.globs.iter().any(|g| fast_glob::glob_match(g, name))
    }

    /// Returns `true` if no filters have been added to the set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.globs.is_empty()
    }

    fn validate(input: &str) -> Result<String, VfsError> {
        let path = validate_path(input)
            .map_err(|_| VfsError::InvalidPattern("path traversal not allowed".into()))?;
        if path.is_root() {
            return Err(VfsError::InvalidPattern("empty path".into()));
        }
        Ok(path.as_str().to_string())
    }
}
