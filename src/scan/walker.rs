//! Filtered depth-first walk populating the file index.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use super::{extension_of, ScanFilters, ScanStats};
use crate::events::EventSender;
use crate::index::FileIndex;

/// Single-threaded recursive directory walk.
///
/// Every surviving file is inserted into the [`FileIndex`]; per-entry
/// errors (permission denied, vanished entries) are logged and skipped so
/// one unreadable directory never aborts the walk.
#[derive(Debug)]
pub struct Traversal {
    filters: ScanFilters,
    cancel: Option<Arc<AtomicBool>>,
}

impl Traversal {
    /// Create a traversal with the given filters.
    #[must_use]
    pub fn new(filters: ScanFilters) -> Self {
        Self {
            filters,
            cancel: None,
        }
    }

    /// Attach a cooperative cancellation flag, checked at the top of each
    /// iteration.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Walk each root depth-first and index every file passing the filters.
    ///
    /// Progress is reported through `events` as a running count of indexed
    /// files, throttled by the sender.
    pub fn scan(&self, roots: &[PathBuf], index: &FileIndex, events: &EventSender) -> ScanStats {
        let mut stats = ScanStats::default();

        'roots: for root in roots {
            let root = root.canonicalize().unwrap_or_else(|_| root.clone());
            log::info!("scanning {}", root.display());

            let walk = WalkDir::new(&root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|entry| {
                    !(entry.file_type().is_dir() && self.filters.is_pruned_dir(entry.path()))
                });

            for entry in walk {
                if self.cancelled() {
                    log::info!("traversal interrupted");
                    stats.interrupted = true;
                    break 'roots;
                }

                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::debug!("walk error, skipping entry: {e}");
                        stats.errors += 1;
                        continue;
                    }
                };

                // Symlinks are never followed, directories carry no content
                if !entry.file_type().is_file() {
                    continue;
                }

                let extension = extension_of(entry.path());
                if self.filters.is_ignored_extension(&extension) {
                    stats.filtered += 1;
                    continue;
                }

                let metadata = match entry.metadata() {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        log::debug!("stat failed for {}: {e}", entry.path().display());
                        stats.errors += 1;
                        continue;
                    }
                };

                let size = metadata.len();
                // Zero-byte files all hash identically and are never indexed
                if size == 0 || size < self.filters.min_file_size {
                    stats.filtered += 1;
                    continue;
                }

                let mtime = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map_or(0, |d| d.as_secs() as i64);

                index.insert(&entry.path().to_string_lossy(), size, mtime, &extension);
                stats.indexed += 1;
                events.scanned(stats.indexed);
            }
        }

        log::info!(
            "traversal done: {} indexed, {} filtered, {} errors",
            stats.indexed,
            stats.filtered,
            stats.errors
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut f = File::create(&path).unwrap();
        f.write_all(content).unwrap();
        path
    }

    fn scan_dir(dir: &TempDir, filters: ScanFilters) -> (ScanStats, FileIndex) {
        let index = FileIndex::open_in_memory().unwrap();
        let (tx, _rx) = events::channel();
        let stats = Traversal::new(filters).scan(&[dir.path().to_path_buf()], &index, &tx);
        (stats, index)
    }

    #[test]
    fn test_indexes_files_recursively() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "a.txt", b"hello");
        write_file(&dir, "sub/nested/b.txt", b"world!");

        let (stats, index) = scan_dir(&dir, ScanFilters::default());
        assert_eq!(stats.indexed, 2);
        assert_eq!(index.len().unwrap(), 2);
    }

    #[test]
    fn test_ignored_folder_is_pruned() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "keep.txt", b"data");
        write_file(&dir, "node_modules/dep/huge.js", b"data");

        let filters = ScanFilters::new(
            vec![dir.path().join("node_modules")],
            Vec::new(),
            0,
        );
        let (stats, index) = scan_dir(&dir, filters);
        assert_eq!(stats.indexed, 1);
        let kept = dir.path().canonicalize().unwrap().join("keep.txt");
        assert!(index.get(&kept.to_string_lossy()).unwrap().is_some());
    }

    #[test]
    fn test_extension_filter() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "x.dat", b"content");
        write_file(&dir, "x.tmp", b"content");

        let filters = ScanFilters::new(Vec::new(), vec![".tmp".to_string()], 0);
        let (stats, index) = scan_dir(&dir, filters);
        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.filtered, 1);
        assert_eq!(index.len().unwrap(), 1);
    }

    #[test]
    fn test_zero_byte_files_never_indexed() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "empty.bin", b"");
        write_file(&dir, "full.bin", b"x");

        // Minimum size zero still excludes empty files
        let (stats, _) = scan_dir(&dir, ScanFilters::new(Vec::new(), Vec::new(), 0));
        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.filtered, 1);
    }

    #[test]
    fn test_min_size_filter() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "small.bin", b"abc");
        write_file(&dir, "large.bin", &[0u8; 128]);

        let (stats, index) = scan_dir(&dir, ScanFilters::new(Vec::new(), Vec::new(), 100));
        assert_eq!(stats.indexed, 1);
        let kept = index.size_collision_groups(0).unwrap();
        assert!(kept.is_empty()); // only one file remains, no collision
    }

    #[test]
    fn test_cancel_flag_stops_walk() {
        let dir = TempDir::new().unwrap();
        for i in 0..20 {
            write_file(&dir, &format!("f{i}.txt"), b"data");
        }

        let flag = Arc::new(AtomicBool::new(true));
        let index = FileIndex::open_in_memory().unwrap();
        let (tx, _rx) = events::channel();
        let stats = Traversal::new(ScanFilters::default())
            .with_cancel_flag(flag)
            .scan(&[dir.path().to_path_buf()], &index, &tx);

        assert!(stats.interrupted);
        assert_eq!(stats.indexed, 0);
    }

    #[test]
    fn test_missing_root_is_an_error_not_a_panic() {
        let index = FileIndex::open_in_memory().unwrap();
        let (tx, _rx) = events::channel();
        let stats = Traversal::new(ScanFilters::default()).scan(
            &[PathBuf::from("/nonexistent/dupescan/root")],
            &index,
            &tx,
        );
        assert_eq!(stats.indexed, 0);
        assert!(stats.errors >= 1);
    }

    #[test]
    fn test_mtime_recorded() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "dated.txt", b"content");
        let past = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&path, past).unwrap();

        let (_, index) = scan_dir(&dir, ScanFilters::default());
        let record = index
            .get(&path.canonicalize().unwrap().to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(record.mtime, 1_600_000_000);
    }
}
