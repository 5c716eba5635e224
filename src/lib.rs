//! dupescan - staged duplicate file finder.
//!
//! Finds duplicate files across one or more roots by narrowing candidates
//! with progressively more expensive signals: file size, then a partial
//! hash of each file's first and last 4 KiB, then a full streaming content
//! hash. Candidates live in a SQLite-backed [`index::FileIndex`]; hashing
//! is pluggable ([`hash::HashStrategy`]) and sized by a one-time hardware
//! benchmark ([`profile::Profiler`]).

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod hash;
pub mod index;
pub mod logging;
pub mod media;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod scan;
pub mod signal;

pub use cli::run_app;
pub use events::ScanEvent;
pub use hash::{HashAlgorithm, HashStrategy};
pub use index::FileIndex;
pub use pipeline::{DuplicateGroup, Pipeline};
pub use profile::{Profiler, SystemProfile};
pub use scan::{ScanFilters, Traversal};
