//! Hardware benchmarking and algorithm recommendation.
//!
//! # Overview
//!
//! The profiler measures the wall-clock throughput of every hash strategy
//! variant against a single random in-memory payload and recommends the
//! fastest one, plus a worker count that leaves headroom for the rest of
//! the system. Results are plain data and serialize into the settings
//! file, so benchmarking is a one-time cost per cache lifetime:
//! [`Profiler::hydrate`] rebuilds a profile from cached scores without
//! re-measuring.

use std::collections::BTreeMap;
use std::time::Instant;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::hash::{HashAlgorithm, VARIABLE_OUTPUT_BITS};

/// Default benchmark payload size: 100 MiB.
pub const DEFAULT_PAYLOAD_SIZE: usize = 100 * 1024 * 1024;

/// Cached result of one benchmark run.
///
/// Never mutated after construction; a fresh profile comes only from
/// re-running the benchmark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemProfile {
    /// Logical CPU count at measurement time.
    pub cpu_count: usize,
    /// Worker-pool size recommendation.
    pub recommended_workers: usize,
    /// Fastest measured algorithm.
    pub recommended: String,
    /// Throughput in MB/s, keyed by variant name (`fast64`,
    /// `blake3_512`, ...). Variable-output algorithms also carry their
    /// 256-bit score under the bare algorithm name.
    pub scores: BTreeMap<String, f64>,
    /// Human-readable summary of the recommendation.
    pub reasoning: String,
}

impl SystemProfile {
    /// The recommendation as a parsed algorithm, falling back to `fast64`
    /// if the cached name is unrecognized.
    #[must_use]
    pub fn recommended_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::parse(&self.recommended).unwrap_or(HashAlgorithm::Fast64)
    }
}

/// Throughput benchmark over the supported hash strategies.
#[derive(Debug)]
pub struct Profiler {
    payload_size: usize,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Profiler {
    /// Profiler with the standard 100 MiB payload.
    #[must_use]
    pub fn new() -> Self {
        Self {
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }

    /// Override the payload size. Tests use small payloads; the default is
    /// large enough that per-call overhead disappears in the noise.
    #[must_use]
    pub fn with_payload_size(mut self, payload_size: usize) -> Self {
        self.payload_size = payload_size.max(1);
        self
    }

    /// Measure every variant and build a fresh profile.
    pub fn run_benchmark(&self) -> SystemProfile {
        let cpu_count = cpu_count();
        let workers = recommended_workers(cpu_count);

        log::info!("benchmarking hash strategies over {} bytes", self.payload_size);
        let mut payload = vec![0u8; self.payload_size];
        rand::thread_rng().fill_bytes(&mut payload);

        let mut scores = BTreeMap::new();
        for algo in [HashAlgorithm::Fast64, HashAlgorithm::Sha256] {
            scores.insert(algo.name().to_string(), self.measure(algo, 0, &payload));
        }
        for algo in [HashAlgorithm::Shake128, HashAlgorithm::Blake3] {
            for bits in VARIABLE_OUTPUT_BITS {
                let score = self.measure(algo, bits, &payload);
                scores.insert(format!("{}_{bits}", algo.name()), score);
                if bits == 256 {
                    scores.insert(algo.name().to_string(), score);
                }
            }
        }
        log::debug!("benchmark scores (MB/s): {scores:?}");

        let (best_key, best_score) = best_of(&scores);
        let recommended = base_name(&best_key);
        let reasoning = suitability(&best_key, best_score);

        SystemProfile {
            cpu_count,
            recommended_workers: workers,
            recommended,
            scores,
            reasoning,
        }
    }

    /// Rebuild a profile from cached scores without benchmarking.
    ///
    /// When no recommendation was cached the best algorithm is recomputed
    /// from the scores; an empty score set degrades to `fast64`.
    #[must_use]
    pub fn hydrate(cached_scores: BTreeMap<String, f64>, recommended: Option<String>) -> SystemProfile {
        let cpu_count = cpu_count();
        let workers = recommended_workers(cpu_count);

        let (best_key, best_score) = match recommended {
            Some(name) => {
                let score = cached_scores.get(&name).copied().unwrap_or(0.0);
                (name, score)
            }
            None => best_of(&cached_scores),
        };
        let recommended = base_name(&best_key);
        let reasoning = suitability(&best_key, best_score);

        SystemProfile {
            cpu_count,
            recommended_workers: workers,
            recommended,
            scores: cached_scores,
            reasoning,
        }
    }

    fn measure(&self, algo: HashAlgorithm, bits: u32, payload: &[u8]) -> f64 {
        let strategy = algo.strategy(bits);
        let start = Instant::now();
        let _ = strategy.digest(payload);
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            // Timer granularity; treat as unmeasurably fast
            return 99_999.0;
        }
        (payload.len() as f64 / (1024.0 * 1024.0)) / elapsed
    }
}

fn cpu_count() -> usize {
    let sys = System::new_all();
    sys.cpus().len().max(1)
}

/// Worker count that leaves headroom for the OS and the consumer of the
/// event stream: one spare core, two on larger machines.
#[must_use]
pub fn recommended_workers(cpu_count: usize) -> usize {
    if cpu_count > 8 {
        cpu_count - 2
    } else {
        cpu_count.saturating_sub(1).max(1)
    }
}

fn best_of(scores: &BTreeMap<String, f64>) -> (String, f64) {
    scores
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(k, v)| (k.clone(), *v))
        .unwrap_or_else(|| (HashAlgorithm::Fast64.name().to_string(), 0.0))
}

/// Strip a `_bits` suffix from a variant key.
fn base_name(key: &str) -> String {
    key.split('_').next().unwrap_or(key).to_string()
}

fn variant_bits(key: &str) -> u32 {
    key.split('_')
        .nth(1)
        .and_then(|b| b.parse().ok())
        .unwrap_or(256)
}

/// Human-readable throughput and collision-margin summary for a variant.
fn suitability(key: &str, score: f64) -> String {
    let gb_s = score / 1024.0;
    let base = base_name(key);
    let bits = match HashAlgorithm::parse(&base) {
        Some(algo) => algo.effective_bits(variant_bits(key)),
        None => 256,
    };
    let margin = match bits {
        64 => "suitable for up to 1 million files before collisions become a practical concern",
        128 => "collision-safe far beyond any realistic corpus (2^64 birthday bound)",
        512 => "collision margins beyond astronomical (2^256 birthday bound)",
        _ => "collision-safe for any realistic corpus (2^128 birthday bound)",
    };
    format!("{base} rated for {gb_s:.1} GB/s ({bits}-bit); {margin}.")
}
