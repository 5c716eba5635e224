//! Bounded execution of hashing work items.
//!
//! Two modes: a fixed-size rayon pool for solid-state media, and inline
//! serialized execution for rotational or network media where concurrent
//! random reads would thrash seeks. The mode and pool size are fixed for
//! the duration of a run.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::media::MediaKind;

/// How hash work items are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Submit all items to a pool of `workers` threads, then join.
    Parallel { workers: usize },
    /// Execute items one at a time on the calling thread.
    Serialized,
}

impl ExecMode {
    /// Pick the execution mode for a storage classification.
    ///
    /// Rotational, network and unidentified media all serialize; only
    /// solid-state media gets the parallel pool.
    #[must_use]
    pub fn for_media(kind: MediaKind, workers: usize) -> Self {
        if kind.forces_serial() {
            Self::Serialized
        } else {
            Self::Parallel {
                workers: workers.max(1),
            }
        }
    }
}

/// Outcome of one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolOutcome {
    /// Items that were executed.
    pub completed: usize,
    /// Whether the cancellation flag cut the run short.
    pub interrupted: bool,
}

/// Fixed-size executor for a scan run.
pub struct WorkerPool {
    mode: ExecMode,
    pool: Option<ThreadPool>,
    cancel: Option<Arc<AtomicBool>>,
}

impl WorkerPool {
    /// Build a pool for the given mode.
    ///
    /// If the rayon pool cannot be created the pool degrades to serialized
    /// execution with a warning rather than failing the run.
    #[must_use]
    pub fn new(mode: ExecMode) -> Self {
        let pool = match mode {
            ExecMode::Parallel { workers } => {
                match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                    Ok(pool) => Some(pool),
                    Err(e) => {
                        log::warn!("failed to build worker pool ({e}), hashing serialized");
                        None
                    }
                }
            }
            ExecMode::Serialized => None,
        };
        Self {
            mode,
            pool,
            cancel: None,
        }
    }

    /// Attach a cooperative cancellation flag, checked before each item.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// The configured execution mode.
    #[must_use]
    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Execute `work` for every item, reporting completion counts through
    /// `progress` as items finish. Completion order within a run is
    /// unspecified in parallel mode; the reported counter is monotonic in
    /// both modes.
    pub fn run<T, F, P>(&self, items: &[T], work: F, progress: P) -> PoolOutcome
    where
        T: Sync,
        F: Fn(&T) + Send + Sync,
        P: Fn(usize, usize) + Send + Sync,
    {
        let total = items.len();
        match &self.pool {
            Some(pool) => {
                let counter = AtomicUsize::new(0);
                let interrupted = AtomicBool::new(false);
                pool.install(|| {
                    items.par_iter().for_each(|item| {
                        if self.cancelled() {
                            interrupted.store(true, Ordering::SeqCst);
                            return;
                        }
                        work(item);
                        let done = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        progress(done, total);
                    });
                });
                PoolOutcome {
                    completed: counter.load(Ordering::SeqCst),
                    interrupted: interrupted.load(Ordering::SeqCst),
                }
            }
            None => {
                let mut outcome = PoolOutcome::default();
                for item in items {
                    if self.cancelled() {
                        outcome.interrupted = true;
                        break;
                    }
                    work(item);
                    outcome.completed += 1;
                    progress(outcome.completed, total);
                }
                outcome
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_mode_for_media() {
        assert_eq!(
            ExecMode::for_media(MediaKind::Ssd, 4),
            ExecMode::Parallel { workers: 4 }
        );
        assert_eq!(ExecMode::for_media(MediaKind::Hdd, 4), ExecMode::Serialized);
        assert_eq!(
            ExecMode::for_media(MediaKind::Network, 4),
            ExecMode::Serialized
        );
        assert_eq!(
            ExecMode::for_media(MediaKind::Unknown, 4),
            ExecMode::Serialized
        );
        // Zero workers is clamped rather than building an empty pool
        assert_eq!(
            ExecMode::for_media(MediaKind::Ssd, 0),
            ExecMode::Parallel { workers: 1 }
        );
    }

    #[test]
    fn test_parallel_executes_all_items() {
        let pool = WorkerPool::new(ExecMode::Parallel { workers: 4 });
        let sum = AtomicUsize::new(0);
        let outcome = pool.run(
            &[1usize, 2, 3, 4, 5],
            |n| {
                sum.fetch_add(*n, Ordering::SeqCst);
            },
            |_, _| {},
        );
        assert_eq!(outcome.completed, 5);
        assert!(!outcome.interrupted);
        assert_eq!(sum.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_serialized_preserves_order() {
        let pool = WorkerPool::new(ExecMode::Serialized);
        let seen = Mutex::new(Vec::new());
        pool.run(
            &["a", "b", "c"],
            |s| seen.lock().unwrap().push(*s),
            |_, _| {},
        );
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_progress_reaches_total() {
        for mode in [ExecMode::Serialized, ExecMode::Parallel { workers: 2 }] {
            let pool = WorkerPool::new(mode);
            let last = Mutex::new((0usize, 0usize));
            pool.run(
                &[0u8; 7],
                |_| {},
                |current, total| {
                    let mut last = last.lock().unwrap();
                    if current > last.0 {
                        *last = (current, total);
                    }
                },
            );
            assert_eq!(*last.lock().unwrap(), (7, 7));
        }
    }

    #[test]
    fn test_cancel_flag_short_circuits() {
        let flag = Arc::new(AtomicBool::new(true));
        for mode in [ExecMode::Serialized, ExecMode::Parallel { workers: 2 }] {
            let pool = WorkerPool::new(mode).with_cancel_flag(Arc::clone(&flag));
            let outcome = pool.run(&[0u8; 16], |_| {}, |_, _| {});
            assert!(outcome.interrupted);
            assert_eq!(outcome.completed, 0);
        }
    }
}
