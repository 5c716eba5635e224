//! Directory traversal and filtering.
//!
//! Traversal is strictly single-threaded recursive I/O: one depth-first
//! walk per root, in order. Parallel directory walking is deliberately not
//! supported; the expensive work lives in the hashing stages, and a
//! predictable walk keeps error handling and cancellation simple.
//!
//! Submodules:
//! - [`walker`]: the filtered walk populating the [`FileIndex`](crate::index::FileIndex)

pub mod walker;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub use walker::Traversal;

/// Filters applied during traversal, in evaluation order:
/// ignored folder (pruned subtree), ignored extension, zero-byte file,
/// minimum size.
#[derive(Debug, Clone, Default)]
pub struct ScanFilters {
    /// Normalized absolute paths of directories to prune entirely.
    pub ignore_folders: HashSet<PathBuf>,
    /// Lowercased extensions (leading dot) to skip.
    pub ignore_extensions: HashSet<String>,
    /// Files smaller than this are skipped. Zero-byte files are always
    /// skipped regardless of this value.
    pub min_file_size: u64,
}

impl ScanFilters {
    /// Build filters from raw configuration values, normalizing folder
    /// paths and lowercasing extensions.
    #[must_use]
    pub fn new<I, E>(ignore_folders: I, ignore_extensions: E, min_file_size: u64) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
        E: IntoIterator<Item = String>,
    {
        Self {
            ignore_folders: ignore_folders
                .into_iter()
                .map(|p| normalize_dir(&p))
                .collect(),
            ignore_extensions: ignore_extensions
                .into_iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
            min_file_size,
        }
    }

    pub(crate) fn is_pruned_dir(&self, path: &Path) -> bool {
        self.ignore_folders.contains(path)
    }

    pub(crate) fn is_ignored_extension(&self, extension: &str) -> bool {
        !extension.is_empty() && self.ignore_extensions.contains(extension)
    }
}

/// Resolve a configured ignore path to the canonical form traversal will
/// encounter. Paths that do not currently exist are kept verbatim.
fn normalize_dir(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Lowercased extension with leading dot, or empty when the file has none.
#[must_use]
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Outcome counters for one traversal run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Files inserted into the index.
    pub indexed: u64,
    /// Entries skipped by a filter.
    pub filtered: u64,
    /// Entries skipped because of an I/O error.
    pub errors: u64,
    /// Whether the walk stopped early on the cancellation flag.
    pub interrupted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("/a/photo.JPG")), ".jpg");
        assert_eq!(extension_of(Path::new("/a/archive.tar.GZ")), ".gz");
        assert_eq!(extension_of(Path::new("/a/Makefile")), "");
        assert_eq!(extension_of(Path::new("/a/.bashrc")), "");
    }

    #[test]
    fn test_filters_lowercase_extensions() {
        let filters = ScanFilters::new(Vec::new(), vec![".TMP".to_string()], 0);
        assert!(filters.is_ignored_extension(".tmp"));
        assert!(!filters.is_ignored_extension(".dat"));
        // A file with no extension never matches
        assert!(!filters.is_ignored_extension(""));
    }
}
