//! Command-line interface and application driver.
//!
//! Argument parsing via the clap derive API, plus [`run_app`], which wires
//! settings, profile, traversal and pipeline together for one scan run.
//! Flags mirror the persisted [`Settings`]: anything given on the command
//! line overrides the settings file for this run only.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytesize::ByteSize;
use clap::Parser;
use directories::ProjectDirs;

use crate::config::Settings;
use crate::error::ExitCode;
use crate::events;
use crate::index::FileIndex;
use crate::media;
use crate::pipeline::{ExecMode, Pipeline, PipelineError, WorkerPool};
use crate::profile::Profiler;
use crate::progress::ProgressRenderer;
use crate::scan::{ScanFilters, ScanStats, Traversal};
use crate::signal;

/// Find duplicate files by size, partial hash, then full hash.
#[derive(Parser, Debug, Clone)]
#[command(name = "dupescan", version, about)]
pub struct Cli {
    /// Directories to scan.
    #[arg(required = true, value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// Minimum file size in bytes; smaller files are not indexed.
    #[arg(long, value_name = "BYTES")]
    pub min_size: Option<u64>,

    /// Directory to prune from traversal (repeatable).
    #[arg(long = "ignore-dir", value_name = "PATH")]
    pub ignore_dirs: Vec<PathBuf>,

    /// File extension to skip, e.g. `.tmp` (repeatable).
    #[arg(long = "ignore-ext", value_name = "EXT")]
    pub ignore_exts: Vec<String>,

    /// Hash algorithm: fast64, sha2-256, shake128, blake3, or auto.
    #[arg(long, value_name = "NAME")]
    pub algo: Option<String>,

    /// Digest length in bits for variable-output algorithms (128/256/512).
    #[arg(long, value_name = "BITS")]
    pub bits: Option<u32>,

    /// Worker threads for the hashing stages.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Force serialized hashing regardless of detected media.
    #[arg(long, conflicts_with = "parallel")]
    pub serial: bool,

    /// Force parallel hashing regardless of detected media.
    #[arg(long)]
    pub parallel: bool,

    /// Re-run the hardware benchmark even if a cached profile exists.
    #[arg(long)]
    pub rebenchmark: bool,

    /// Settings file to use instead of the platform default.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// File index database path (default: platform cache directory).
    #[arg(long, value_name = "FILE")]
    pub index_db: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress output; errors only.
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Fold command-line overrides into the loaded settings.
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(min_size) = self.min_size {
            settings.min_file_size = min_size;
        }
        if let Some(algo) = &self.algo {
            settings.hash_algo = algo.clone();
        }
        if let Some(bits) = self.bits {
            settings.hash_bits = bits;
        }
        if let Some(workers) = self.workers {
            settings.thread_count = Some(workers);
        }
        settings.ignore_folders.extend(self.ignore_dirs.iter().cloned());
        settings
            .ignore_extensions
            .extend(self.ignore_exts.iter().map(|e| normalize_extension(e)));
    }
}

/// Ensure an extension filter carries a leading dot and lowercase form.
fn normalize_extension(ext: &str) -> String {
    let ext = ext.to_ascii_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

/// Run one scan and report the duplicate groups.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    cli.apply_to(&mut settings);

    // Profile: hydrate from cache unless asked to measure again
    let profile = match (cli.rebenchmark, settings.cached_profile()) {
        (false, Some(profile)) => {
            log::debug!("using cached benchmark profile");
            profile
        }
        _ => {
            let profile = Profiler::new().run_benchmark();
            settings.remember_profile(&profile);
            let saved = match &cli.config {
                Some(path) => settings.save_to(path),
                None => settings.save(),
            };
            if let Err(e) = saved {
                log::warn!("could not persist benchmark profile: {e}");
            }
            profile
        }
    };
    log::info!("{}", profile.reasoning);

    let algorithm = settings.resolve_algorithm(&profile);
    let strategy: Arc<dyn crate::hash::HashStrategy> =
        Arc::from(algorithm.strategy(settings.hash_bits));
    log::info!(
        "hashing with {} ({}-bit digests)",
        algorithm,
        algorithm.effective_bits(settings.hash_bits)
    );

    let token = signal::install_handler()?;

    // Execution mode from storage classification, unless overridden
    let workers = settings
        .thread_count
        .unwrap_or(profile.recommended_workers)
        .max(1);
    let mode = if cli.serial {
        ExecMode::Serialized
    } else if cli.parallel {
        ExecMode::Parallel { workers }
    } else {
        let kind = media::classify_roots(&cli.roots);
        log::info!("scan roots classified as {kind:?}");
        ExecMode::for_media(kind, workers)
    };
    log::debug!("hashing mode: {mode:?}");

    let index = open_index(cli.index_db.as_deref())?;
    // Every run starts from a clean slate
    index.clear().context("failed to reset the file index")?;
    let index = Arc::new(index);

    let (events, rx) = events::channel();
    let renderer = ProgressRenderer::spawn(rx, cli.quiet);

    let filters = ScanFilters::new(
        settings.ignore_folders.clone(),
        settings.ignore_extensions.clone(),
        settings.min_file_size,
    );
    let stats = Traversal::new(filters)
        .with_cancel_flag(token.flag())
        .scan(&cli.roots, &index, &events);

    if stats.interrupted {
        drop(events);
        renderer.join();
        return Ok(ExitCode::Interrupted);
    }

    let pool = WorkerPool::new(mode).with_cancel_flag(token.flag());
    let pipeline = Pipeline::new(Arc::clone(&index), strategy, pool)
        .with_min_file_size(settings.min_file_size)
        .with_cancel_flag(token.flag());
    let result = pipeline.run(&events);

    drop(events);
    renderer.join();

    let groups = match result {
        Ok(groups) => groups,
        Err(PipelineError::Interrupted) => return Ok(ExitCode::Interrupted),
        Err(e) => return Err(e.into()),
    };

    report(&groups, &stats);

    Ok(if groups.is_empty() {
        ExitCode::NoDuplicates
    } else if stats.errors > 0 {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    })
}

/// Open the index at the given path, the platform cache directory, or as a
/// last resort in memory.
fn open_index(path: Option<&std::path::Path>) -> Result<FileIndex> {
    if let Some(path) = path {
        return FileIndex::open(path)
            .with_context(|| format!("failed to open index at {}", path.display()));
    }

    if let Some(dirs) = ProjectDirs::from("com", "dupescan", "dupescan") {
        let dir = dirs.cache_dir();
        if std::fs::create_dir_all(dir).is_ok() {
            let path = dir.join("index.db");
            match FileIndex::open(&path) {
                Ok(index) => return Ok(index),
                Err(e) => log::warn!("cache index unavailable ({e}), using in-memory index"),
            }
        }
    }
    Ok(FileIndex::open_in_memory()?)
}

fn report(groups: &[crate::pipeline::DuplicateGroup], stats: &ScanStats) {
    let wasted: u64 = groups.iter().map(|g| g.wasted_bytes()).sum();
    let members: usize = groups.iter().map(|g| g.files.len()).sum();

    println!();
    for (i, group) in groups.iter().enumerate() {
        let hash_prefix = &group.hash[..group.hash.len().min(16)];
        println!(
            "Group {}: {} files x {} ({}...)",
            i + 1,
            group.files.len(),
            ByteSize::b(group.size),
            hash_prefix
        );
        for file in &group.files {
            println!("  {}", file.path);
        }
    }

    println!(
        "\n{} indexed, {} duplicate groups covering {} files, {} reclaimable",
        stats.indexed,
        groups.len(),
        members,
        ByteSize::b(wasted)
    );
    if stats.errors > 0 {
        println!("{} entries skipped on errors", stats.errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_basic_invocation() {
        let cli = Cli::try_parse_from([
            "dupescan",
            "/data",
            "--min-size",
            "1024",
            "--ignore-ext",
            "tmp",
            "--algo",
            "blake3",
            "--bits",
            "512",
        ])
        .unwrap();

        assert_eq!(cli.roots, vec![PathBuf::from("/data")]);
        assert_eq!(cli.min_size, Some(1024));
        assert_eq!(cli.algo.as_deref(), Some("blake3"));

        let mut settings = Settings::default();
        cli.apply_to(&mut settings);
        assert_eq!(settings.min_file_size, 1024);
        assert_eq!(settings.hash_algo, "blake3");
        assert_eq!(settings.hash_bits, 512);
        assert_eq!(settings.ignore_extensions, vec![".tmp".to_string()]);
    }

    #[test]
    fn test_cli_requires_a_root() {
        assert!(Cli::try_parse_from(["dupescan"]).is_err());
    }

    #[test]
    fn test_serial_conflicts_with_parallel() {
        assert!(Cli::try_parse_from(["dupescan", "/data", "--serial", "--parallel"]).is_err());
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("TMP"), ".tmp");
        assert_eq!(normalize_extension(".Log"), ".log");
    }
}
