//! Persistent candidate file index.
//!
//! # Overview
//!
//! The [`FileIndex`] is the queryable catalog the pipeline narrows against:
//! traversal inserts every surviving file, the hashing stages attach partial
//! and full hashes, and the collision-group queries drive stage selection.
//! It is backed by SQLite so the collision groupings stay sub-quadratic via
//! indexes on `size` and `partial_hash`.
//!
//! The index is disposable working state: it is cleared at the start of
//! every scan run and carries no file identity across runs.
//!
//! # Concurrency
//!
//! Worker threads read and write concurrently. The connection is guarded by
//! a mutex and every public operation executes exactly one statement while
//! holding it, so each logical operation is its own implicit transaction
//! and lock duration stays bounded.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

/// Errors surfaced by index operations.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The underlying SQLite operation failed.
    #[error("index storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// A file known to the index.
///
/// Hash fields are attached in stages: `partial_hash` only after the file
/// survived size grouping, `full_hash` only after it survived partial-hash
/// grouping. A record can never have `full_hash` without `partial_hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path (unique identity).
    pub path: String,
    /// Size in bytes, always greater than zero.
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
    /// Lowercased extension including the leading dot, empty if none.
    pub extension: String,
    /// Hex digest of head+tail chunks, if computed.
    pub partial_hash: Option<String>,
    /// Hex digest of the full content, if computed.
    pub full_hash: Option<String>,
}

/// One confirmed-duplicate row from [`FileIndex::final_duplicates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRow {
    /// Hex digest shared by every member of the group.
    pub full_hash: String,
    /// Size in bytes.
    pub size: u64,
    /// Absolute path.
    pub path: String,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
}

/// SQLite-backed file catalog.
pub struct FileIndex {
    conn: Mutex<Connection>,
}

impl FileIndex {
    /// Open or create an index at the given path.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a fresh in-memory index. Used by tests and one-off scans.
    pub fn open_in_memory() -> Result<Self, IndexError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, IndexError> {
        // WAL keeps readers unblocked while workers write hash updates.
        // In-memory databases reject WAL; fall back quietly there.
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            log::debug!("WAL unavailable, continuing with default journal: {e}");
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE NOT NULL,
                size INTEGER NOT NULL,
                mtime INTEGER NOT NULL,
                extension TEXT NOT NULL,
                partial_hash TEXT,
                full_hash TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_files_size ON files(size);
            CREATE INDEX IF NOT EXISTS idx_files_partial ON files(partial_hash);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record a discovered file.
    ///
    /// Idempotent: re-inserting an already known path is a no-op. Storage
    /// errors are logged and swallowed so one bad row never aborts a scan.
    pub fn insert(&self, path: &str, size: u64, mtime: i64, extension: &str) {
        if let Err(e) = self.try_insert(path, size, mtime, extension) {
            log::warn!("failed to index {path}: {e}");
        }
    }

    fn try_insert(
        &self,
        path: &str,
        size: u64,
        mtime: i64,
        extension: &str,
    ) -> Result<(), IndexError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO files (path, size, mtime, extension) VALUES (?1, ?2, ?3, ?4)",
            params![path, size as i64, mtime, extension],
        )?;
        Ok(())
    }

    /// Attach a partial (head+tail) hash to a record.
    pub fn set_partial_hash(&self, path: &str, hex_digest: &str) -> Result<(), IndexError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE files SET partial_hash = ?1 WHERE path = ?2",
            params![hex_digest, path],
        )?;
        Ok(())
    }

    /// Attach a full-content hash to a record.
    pub fn set_full_hash(&self, path: &str, hex_digest: &str) -> Result<(), IndexError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE files SET full_hash = ?1 WHERE path = ?2",
            params![hex_digest, path],
        )?;
        Ok(())
    }

    /// Files whose size is shared by at least two records, size >= `min_size`,
    /// largest first. These are the stage-1 candidates.
    pub fn size_collision_groups(&self, min_size: u64) -> Result<Vec<FileRecord>, IndexError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT path, size, mtime, extension, partial_hash, full_hash
             FROM files WHERE size IN (
                 SELECT size FROM files
                 WHERE size >= ?1
                 GROUP BY size
                 HAVING COUNT(*) > 1
             )
             ORDER BY size DESC",
        )?;
        let rows = stmt.query_map(params![min_size as i64], row_to_record)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Files whose non-null partial hash is shared by at least two records,
    /// largest first. These are the stage-2 candidates.
    pub fn partial_hash_collision_groups(&self) -> Result<Vec<FileRecord>, IndexError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT path, size, mtime, extension, partial_hash, full_hash
             FROM files WHERE partial_hash IS NOT NULL AND partial_hash IN (
                 SELECT partial_hash FROM files
                 WHERE partial_hash IS NOT NULL
                 GROUP BY partial_hash
                 HAVING COUNT(*) > 1
             )
             ORDER BY size DESC",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All records whose full hash is shared by at least two records,
    /// ordered by size descending, then hash.
    pub fn final_duplicates(&self) -> Result<Vec<DuplicateRow>, IndexError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT full_hash, size, path, mtime
             FROM files WHERE full_hash IS NOT NULL AND full_hash IN (
                 SELECT full_hash FROM files
                 WHERE full_hash IS NOT NULL
                 GROUP BY full_hash
                 HAVING COUNT(*) > 1
             )
             ORDER BY size DESC, full_hash",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DuplicateRow {
                full_hash: row.get(0)?,
                size: row.get::<_, i64>(1)? as u64,
                path: row.get(2)?,
                mtime: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Fetch a single record by path.
    pub fn get(&self, path: &str) -> Result<Option<FileRecord>, IndexError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT path, size, mtime, extension, partial_hash, full_hash
             FROM files WHERE path = ?1",
        )?;
        stmt.query_row(params![path], row_to_record)
            .optional()
            .map_err(Into::into)
    }

    /// Number of indexed files.
    pub fn len(&self) -> Result<u64, IndexError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Whether the index holds no records.
    pub fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len()? == 0)
    }

    /// Drop every record. Called at the start of each scan run.
    pub fn clear(&self) -> Result<(), IndexError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM files", [])?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        path: row.get(0)?,
        size: row.get::<_, i64>(1)? as u64,
        mtime: row.get(2)?,
        extension: row.get(3)?,
        partial_hash: row.get(4)?,
        full_hash: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(files: &[(&str, u64)]) -> FileIndex {
        let index = FileIndex::open_in_memory().unwrap();
        for (path, size) in files {
            index.insert(path, *size, 1_700_000_000, ".txt");
        }
        index
    }

    #[test]
    fn test_insert_is_idempotent() {
        let index = index_with(&[("/a.txt", 10)]);
        index.insert("/a.txt", 10, 1_700_000_000, ".txt");
        assert_eq!(index.len().unwrap(), 1);
    }

    #[test]
    fn test_size_collision_groups() {
        let index = index_with(&[("/a", 10), ("/b", 10), ("/c", 20), ("/d", 30), ("/e", 30)]);

        let records = index.size_collision_groups(0).unwrap();
        let paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
        // Unique size 20 is excluded, larger group first
        assert_eq!(paths, vec!["/d", "/e", "/a", "/b"]);
    }

    #[test]
    fn test_size_collision_groups_min_size() {
        let index = index_with(&[("/a", 10), ("/b", 10), ("/c", 500), ("/d", 500)]);

        let records = index.size_collision_groups(100).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.size == 500));
    }

    #[test]
    fn test_partial_hash_collision_groups() {
        let index = index_with(&[("/a", 10), ("/b", 10), ("/c", 10)]);
        index.set_partial_hash("/a", "aaaa").unwrap();
        index.set_partial_hash("/b", "aaaa").unwrap();
        index.set_partial_hash("/c", "cccc").unwrap();

        let records = index.partial_hash_collision_groups().unwrap();
        let paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&"/a") && paths.contains(&"/b"));
    }

    #[test]
    fn test_null_partial_hash_never_collides() {
        // Records that failed stage 1 keep NULL and must not group together
        let index = index_with(&[("/a", 10), ("/b", 10)]);
        assert!(index.partial_hash_collision_groups().unwrap().is_empty());
    }

    #[test]
    fn test_final_duplicates_ordering() {
        let index = index_with(&[("/a", 10), ("/b", 10), ("/big1", 99), ("/big2", 99)]);
        for path in ["/a", "/b", "/big1", "/big2"] {
            index.set_partial_hash(path, "p").unwrap();
        }
        index.set_full_hash("/a", "small").unwrap();
        index.set_full_hash("/b", "small").unwrap();
        index.set_full_hash("/big1", "large").unwrap();
        index.set_full_hash("/big2", "large").unwrap();

        let rows = index.final_duplicates().unwrap();
        let paths: Vec<_> = rows.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/big1", "/big2", "/a", "/b"]);
    }

    #[test]
    fn test_final_duplicates_excludes_unique_hashes() {
        let index = index_with(&[("/a", 10), ("/b", 10)]);
        index.set_full_hash("/a", "xx").unwrap();
        index.set_full_hash("/b", "yy").unwrap();
        assert!(index.final_duplicates().unwrap().is_empty());
    }

    #[test]
    fn test_clear() {
        let index = index_with(&[("/a", 10), ("/b", 10)]);
        index.clear().unwrap();
        assert!(index.is_empty().unwrap());
        assert!(index.size_collision_groups(0).unwrap().is_empty());
    }

    #[test]
    fn test_get_roundtrip() {
        let index = index_with(&[("/a", 10)]);
        let record = index.get("/a").unwrap().unwrap();
        assert_eq!(record.size, 10);
        assert_eq!(record.extension, ".txt");
        assert!(record.partial_hash.is_none());
        assert!(record.full_hash.is_none());
        assert!(index.get("/missing").unwrap().is_none());
    }

    #[test]
    fn test_concurrent_hash_writes() {
        use std::sync::Arc;

        let index = Arc::new(index_with(&[]));
        for i in 0..64 {
            index.insert(&format!("/f{i}"), 42, 0, "");
        }

        let mut handles = Vec::new();
        for i in 0..8 {
            let index = Arc::clone(&index);
            handles.push(std::thread::spawn(move || {
                for j in 0..8 {
                    let path = format!("/f{}", i * 8 + j);
                    index.set_partial_hash(&path, "shared").unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(index.partial_hash_collision_groups().unwrap().len(), 64);
    }
}
