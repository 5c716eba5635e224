//! Scan settings persistence.
//!
//! A flat JSON file at the platform config directory, merged over
//! compiled-in defaults on load: missing keys take their default value and
//! unknown keys are ignored, so the file survives both older and newer
//! versions of the tool. The cached benchmark profile lives here too, which
//! is what lets startup skip re-benchmarking.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::hash::{HashAlgorithm, DEFAULT_OUTPUT_BITS};
use crate::profile::{Profiler, SystemProfile};

/// Persisted scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Hash algorithm name, or `"auto"` to use the profile recommendation.
    pub hash_algo: String,
    /// Requested digest length in bits (honored by variable-output
    /// algorithms only).
    pub hash_bits: u32,
    /// Files below this size in bytes are not indexed.
    pub min_file_size: u64,
    /// Worker count override; `None` means use the profile recommendation.
    pub thread_count: Option<usize>,
    /// Absolute directory paths pruned from traversal.
    pub ignore_folders: Vec<PathBuf>,
    /// Extensions (lowercase, leading dot) skipped during traversal.
    pub ignore_extensions: Vec<String>,
    /// Cached benchmark scores from the last profiling run.
    pub benchmark_scores: Option<BTreeMap<String, f64>>,
    /// Cached algorithm recommendation from the last profiling run.
    pub recommended_algo: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hash_algo: "auto".to_string(),
            hash_bits: DEFAULT_OUTPUT_BITS,
            min_file_size: 0,
            thread_count: None,
            ignore_folders: Vec::new(),
            ignore_extensions: Vec::new(),
            benchmark_scores: None,
            recommended_algo: None,
        }
    }
}

impl Settings {
    /// Load from the default platform-specific path, falling back to
    /// defaults if the file is missing or unreadable.
    #[must_use]
    pub fn load() -> Self {
        match Self::config_path() {
            Ok(path) => Self::load_from(&path),
            Err(e) => {
                log::debug!("no config directory available: {e}");
                Self::default()
            }
        }
    }

    /// Load from an explicit path; any failure yields defaults.
    #[must_use]
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let parsed = fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| serde_json::from_str(&content).map_err(anyhow::Error::from));
        match parsed {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("failed to load settings from {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Save to the default platform-specific path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "dupescan", "dupescan")
            .ok_or_else(|| anyhow::anyhow!("failed to determine project directories"))?;
        Ok(dirs.config_dir().join("config.json"))
    }

    /// The profile cached in this settings file, if any scores were saved.
    #[must_use]
    pub fn cached_profile(&self) -> Option<SystemProfile> {
        self.benchmark_scores
            .as_ref()
            .map(|scores| Profiler::hydrate(scores.clone(), self.recommended_algo.clone()))
    }

    /// Store a freshly measured profile for future startups.
    pub fn remember_profile(&mut self, profile: &SystemProfile) {
        self.benchmark_scores = Some(profile.scores.clone());
        self.recommended_algo = Some(profile.recommended.clone());
    }

    /// Resolve the configured algorithm name, mapping `"auto"` (and any
    /// unknown name, with a warning) to the profile recommendation.
    #[must_use]
    pub fn resolve_algorithm(&self, profile: &SystemProfile) -> HashAlgorithm {
        if self.hash_algo.eq_ignore_ascii_case("auto") {
            return profile.recommended_algorithm();
        }
        match HashAlgorithm::parse(&self.hash_algo) {
            Some(algo) => algo,
            None => {
                log::warn!(
                    "unknown hash_algo {:?}, using profile recommendation",
                    self.hash_algo
                );
                profile.recommended_algorithm()
            }
        }
    }
}
