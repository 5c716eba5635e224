//! Three-stage duplicate narrowing.
//!
//! # Overview
//!
//! The pipeline narrows candidates with cheap signals first and expensive
//! signals last, querying the [`FileIndex`] between stages:
//!
//! 1. **Size collisions**: files sharing a size get a *partial hash*, a
//!    digest of the first and last 4 KiB. Reading 8 KiB per file separates
//!    most same-size non-duplicates without touching the bulk of the file.
//! 2. **Partial-hash collisions**: survivors get a *full hash*, streamed
//!    through the configured [`HashStrategy`] in bounded reads.
//! 3. **Full-hash collisions**: the index query yields the confirmed
//!    groups; singleton groups left behind by error dropout are discarded.
//!
//! Files that cannot be read at a hashing stage keep a NULL hash and
//! silently drop out of later stages: one unreadable file must never block
//! duplicate detection elsewhere.
//!
//! Submodules:
//! - [`pool`]: the worker pool executing the hashing stages

pub mod pool;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::events::{EventSender, HashStage};
use crate::hash::{digest_to_hex, HashStrategy};
use crate::index::{DuplicateRow, FileIndex, IndexError};

pub use pool::{ExecMode, PoolOutcome, WorkerPool};

/// Bytes hashed from each end of a file for the partial hash.
pub const PARTIAL_CHUNK_SIZE: usize = 4096;

/// Read granularity when streaming a whole file.
pub const FULL_READ_BUFFER: usize = 64 * 1024;

/// Errors that abort a pipeline run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// A collision-group query failed; the index is unusable.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// The cancellation flag was observed before the run finished.
    #[error("scan interrupted")]
    Interrupted,
}

/// One member of a confirmed duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateFile {
    /// Absolute path.
    pub path: String,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
}

/// A set of files sharing a full-content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Hex digest shared by all members.
    pub hash: String,
    /// Size in bytes of each member.
    pub size: u64,
    /// The members, ordered as returned by the index.
    pub files: Vec<DuplicateFile>,
}

impl DuplicateGroup {
    /// Bytes that deleting all but one copy would reclaim.
    #[must_use]
    pub fn wasted_bytes(&self) -> u64 {
        self.size * (self.files.len().saturating_sub(1)) as u64
    }
}

/// The scan-narrowing pipeline for one run.
///
/// The hash strategy is fixed for the lifetime of the pipeline; swapping
/// algorithms mid-run would mix digest formats within one result set.
pub struct Pipeline {
    index: Arc<FileIndex>,
    strategy: Arc<dyn HashStrategy>,
    pool: WorkerPool,
    min_file_size: u64,
    cancel: Option<Arc<AtomicBool>>,
}

impl Pipeline {
    /// Create a pipeline over an already populated index.
    #[must_use]
    pub fn new(index: Arc<FileIndex>, strategy: Arc<dyn HashStrategy>, pool: WorkerPool) -> Self {
        Self {
            index,
            strategy,
            pool,
            min_file_size: 0,
            cancel: None,
        }
    }

    /// Only consider size-collision groups at or above this size.
    #[must_use]
    pub fn with_min_file_size(mut self, min_file_size: u64) -> Self {
        self.min_file_size = min_file_size;
        self
    }

    /// Attach a cooperative cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Execute stages 1-3 and return the confirmed duplicate groups.
    ///
    /// Emits throttled progress events for both hashing stages and a single
    /// terminal event: `Complete` on success, `Error` on a fatal index
    /// failure. Nothing is emitted after an abort.
    pub fn run(&self, events: &EventSender) -> Result<Vec<DuplicateGroup>, PipelineError> {
        // Stage 1: partial hashes for size collisions
        let candidates = self.query(events, |index| {
            index.size_collision_groups(self.min_file_size)
        })?;
        log::info!("stage 1: {} size-collision candidates", candidates.len());

        let outcome = self.pool.run(
            &candidates,
            |record| {
                match compute_partial(Path::new(&record.path), self.strategy.as_ref()) {
                    Ok(digest) => {
                        let hex = digest_to_hex(&digest);
                        if let Err(e) = self.index.set_partial_hash(&record.path, &hex) {
                            log::warn!("dropping {}: {e}", record.path);
                        }
                    }
                    // Unreadable: keep NULL, the file drops out of stage 2
                    Err(e) => log::debug!("partial hash failed for {}: {e}", record.path),
                }
            },
            |current, total| events.hashing(HashStage::Partial, current, total),
        );
        if outcome.interrupted {
            return Err(PipelineError::Interrupted);
        }

        // Stage 2: full hashes for partial-hash collisions
        let candidates = self.query(events, FileIndex::partial_hash_collision_groups)?;
        log::info!("stage 2: {} partial-hash-collision candidates", candidates.len());

        let outcome = self.pool.run(
            &candidates,
            |record| {
                let cancel = self.cancel.as_deref();
                match compute_full(Path::new(&record.path), self.strategy.as_ref(), cancel) {
                    Ok(digest) => {
                        let hex = digest_to_hex(&digest);
                        if let Err(e) = self.index.set_full_hash(&record.path, &hex) {
                            log::warn!("dropping {}: {e}", record.path);
                        }
                    }
                    Err(e) => log::debug!("full hash failed for {}: {e}", record.path),
                }
            },
            |current, total| events.hashing(HashStage::Full, current, total),
        );
        if outcome.interrupted {
            return Err(PipelineError::Interrupted);
        }

        // Stage 3: materialize groups, discard singletons left by dropout
        let rows = self.query(events, FileIndex::final_duplicates)?;
        let groups = group_rows(rows);
        log::info!("stage 3: {} duplicate groups", groups.len());

        events.complete();
        Ok(groups)
    }

    /// Run an index query, converting failure into the terminal error event.
    fn query<T>(
        &self,
        events: &EventSender,
        op: impl FnOnce(&FileIndex) -> Result<T, IndexError>,
    ) -> Result<T, PipelineError> {
        op(&self.index).map_err(|e| {
            events.error(e.to_string());
            PipelineError::Index(e)
        })
    }
}

/// Digest of a file's first and last [`PARTIAL_CHUNK_SIZE`] bytes.
///
/// For files no larger than one chunk the tail is left empty so the
/// overlapping bytes are not hashed twice.
pub fn compute_partial(path: &Path, strategy: &dyn HashStrategy) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    let head_len = (size as usize).min(PARTIAL_CHUNK_SIZE);
    let mut combined = vec![0u8; head_len];
    file.read_exact(&mut combined)?;

    if size > PARTIAL_CHUNK_SIZE as u64 {
        let mut tail = vec![0u8; PARTIAL_CHUNK_SIZE];
        file.seek(SeekFrom::Start(size - PARTIAL_CHUNK_SIZE as u64))?;
        file.read_exact(&mut tail)?;
        combined.extend_from_slice(&tail);
    }

    Ok(strategy.digest(&combined))
}

/// Digest of a file's entire content, streamed in [`FULL_READ_BUFFER`]
/// reads. Checks the cancellation flag between reads; the in-flight read
/// always completes.
pub fn compute_full(
    path: &Path,
    strategy: &dyn HashStrategy,
    cancel: Option<&AtomicBool>,
) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut hasher = strategy.hasher();
    let mut buffer = vec![0u8; FULL_READ_BUFFER];

    loop {
        if cancel.is_some_and(|f| f.load(Ordering::SeqCst)) {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "scan cancelled"));
        }
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Group ordered duplicate rows by hash, discarding singletons.
///
/// A shared full hash with a single surviving member means the original
/// collision was resolved upstream by error dropout, not a true duplicate.
fn group_rows(rows: Vec<DuplicateRow>) -> Vec<DuplicateGroup> {
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    for row in rows {
        match groups.last_mut() {
            Some(group) if group.hash == row.full_hash => group.files.push(DuplicateFile {
                path: row.path,
                mtime: row.mtime,
            }),
            _ => groups.push(DuplicateGroup {
                hash: row.full_hash,
                size: row.size,
                files: vec![DuplicateFile {
                    path: row.path,
                    mtime: row.mtime,
                }],
            }),
        }
    }
    groups.retain(|g| g.files.len() >= 2);
    groups
}
