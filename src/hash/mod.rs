//! Pluggable content hashing.
//!
//! # Overview
//!
//! Every pipeline stage that touches file content goes through a
//! [`HashStrategy`]: a one-shot [`digest`](HashStrategy::digest) for small
//! buffers (the head+tail partial hash) and a streaming
//! [`StreamHasher`] for whole files. Both paths are required to produce
//! identical output for identical input, since partial hashes are computed
//! one-shot while full hashes are streamed.
//!
//! Four algorithms are supported:
//!
//! | Algorithm | Output | Notes |
//! |-----------|--------|-------|
//! | `fast64`  | 64-bit fixed | xxh64, non-cryptographic, fastest |
//! | `sha2-256`| 256-bit fixed | |
//! | `shake128`| 128/256/512-bit | SHA-3 XOF |
//! | `blake3`  | 128/256/512-bit | XOF via the BLAKE3 output reader |
//!
//! Strategies are selected by configuration value, not by subclassing:
//! [`HashAlgorithm::strategy`] is the single construction point.

use std::fmt;

use blake3::Hasher as Blake3Hasher;
use sha2::{Digest as Sha2Digest, Sha256};
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake128;
use xxhash_rust::xxh64::{xxh64, Xxh64};

/// Output lengths accepted by the variable-output algorithms, in bits.
pub const VARIABLE_OUTPUT_BITS: [u32; 3] = [128, 256, 512];

/// Default output length for variable-output algorithms, in bits.
pub const DEFAULT_OUTPUT_BITS: u32 = 256;

/// The supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// xxh64: non-cryptographic, 64-bit, highest throughput.
    Fast64,
    /// SHA-256: cryptographic, fixed 256-bit output.
    Sha256,
    /// SHAKE128: cryptographic, variable output length.
    Shake128,
    /// BLAKE3: cryptographic, variable output length.
    Blake3,
}

impl HashAlgorithm {
    /// All algorithms, in benchmark order.
    pub const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::Fast64,
        HashAlgorithm::Sha256,
        HashAlgorithm::Shake128,
        HashAlgorithm::Blake3,
    ];

    /// Canonical configuration name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Fast64 => "fast64",
            Self::Sha256 => "sha2-256",
            Self::Shake128 => "shake128",
            Self::Blake3 => "blake3",
        }
    }

    /// Parse a configuration value.
    ///
    /// Returns `None` for unknown names; `"auto"` is not an algorithm and
    /// must be resolved against a profile before calling this.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fast64" | "xxhash" | "xxh64" => Some(Self::Fast64),
            "sha2-256" | "sha256" => Some(Self::Sha256),
            "shake128" | "shake_128" => Some(Self::Shake128),
            "blake3" => Some(Self::Blake3),
            _ => None,
        }
    }

    /// Whether the caller-requested output length is honored.
    #[must_use]
    pub fn is_variable_output(self) -> bool {
        matches!(self, Self::Shake128 | Self::Blake3)
    }

    /// The digest length in bits this algorithm produces for a requested
    /// output length.
    ///
    /// Fixed-output algorithms ignore the request entirely. Variable-output
    /// algorithms accept 128, 256 or 512 and fall back to
    /// [`DEFAULT_OUTPUT_BITS`] for anything else.
    #[must_use]
    pub fn effective_bits(self, requested_bits: u32) -> u32 {
        match self {
            Self::Fast64 => 64,
            Self::Sha256 => 256,
            Self::Shake128 | Self::Blake3 => {
                if VARIABLE_OUTPUT_BITS.contains(&requested_bits) {
                    requested_bits
                } else {
                    DEFAULT_OUTPUT_BITS
                }
            }
        }
    }

    /// Construct the strategy for this algorithm at the requested output
    /// length.
    #[must_use]
    pub fn strategy(self, requested_bits: u32) -> Box<dyn HashStrategy> {
        let out_len = self.effective_bits(requested_bits) as usize / 8;
        match self {
            Self::Fast64 => Box::new(Fast64Strategy),
            Self::Sha256 => Box::new(Sha256Strategy),
            Self::Shake128 => Box::new(Shake128Strategy { out_len }),
            Self::Blake3 => Box::new(Blake3Strategy { out_len }),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Incremental hasher for streaming whole files.
pub trait StreamHasher: Send {
    /// Absorb a chunk of input.
    fn update(&mut self, data: &[u8]);

    /// Consume the hasher and return the digest.
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// A configured hash algorithm.
///
/// Implementations are stateless and cheap to share; the per-file state
/// lives in the [`StreamHasher`] returned by [`hasher`](Self::hasher).
pub trait HashStrategy: Send + Sync {
    /// Canonical algorithm name.
    fn name(&self) -> &'static str;

    /// Digest length in bytes.
    fn output_bytes(&self) -> usize;

    /// One-shot digest of an in-memory buffer.
    fn digest(&self, data: &[u8]) -> Vec<u8>;

    /// Fresh incremental hasher. Must agree bit-for-bit with
    /// [`digest`](Self::digest).
    fn hasher(&self) -> Box<dyn StreamHasher>;
}

/// Hex-encode a digest for storage in the file index.
#[must_use]
pub fn digest_to_hex(digest: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

struct Fast64Strategy;

impl HashStrategy for Fast64Strategy {
    fn name(&self) -> &'static str {
        "fast64"
    }

    fn output_bytes(&self) -> usize {
        8
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        xxh64(data, 0).to_be_bytes().to_vec()
    }

    fn hasher(&self) -> Box<dyn StreamHasher> {
        Box::new(Fast64Stream(Xxh64::new(0)))
    }
}

struct Fast64Stream(Xxh64);

impl StreamHasher for Fast64Stream {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.digest().to_be_bytes().to_vec()
    }
}

struct Sha256Strategy;

impl HashStrategy for Sha256Strategy {
    fn name(&self) -> &'static str {
        "sha2-256"
    }

    fn output_bytes(&self) -> usize {
        32
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    fn hasher(&self) -> Box<dyn StreamHasher> {
        Box::new(Sha256Stream(Sha256::new()))
    }
}

struct Sha256Stream(Sha256);

impl StreamHasher for Sha256Stream {
    fn update(&mut self, data: &[u8]) {
        Sha2Digest::update(&mut self.0, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

struct Shake128Strategy {
    out_len: usize,
}

impl HashStrategy for Shake128Strategy {
    fn name(&self) -> &'static str {
        "shake128"
    }

    fn output_bytes(&self) -> usize {
        self.out_len
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut shake = Shake128::default();
        shake.update(data);
        read_xof(shake, self.out_len)
    }

    fn hasher(&self) -> Box<dyn StreamHasher> {
        Box::new(Shake128Stream {
            shake: Shake128::default(),
            out_len: self.out_len,
        })
    }
}

struct Shake128Stream {
    shake: Shake128,
    out_len: usize,
}

impl StreamHasher for Shake128Stream {
    fn update(&mut self, data: &[u8]) {
        Update::update(&mut self.shake, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        read_xof(self.shake, self.out_len)
    }
}

fn read_xof(shake: Shake128, out_len: usize) -> Vec<u8> {
    let mut reader = shake.finalize_xof();
    let mut out = vec![0u8; out_len];
    reader.read(&mut out);
    out
}

struct Blake3Strategy {
    out_len: usize,
}

impl HashStrategy for Blake3Strategy {
    fn name(&self) -> &'static str {
        "blake3"
    }

    fn output_bytes(&self) -> usize {
        self.out_len
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = Blake3Hasher::new();
        hasher.update(data);
        blake3_output(&hasher, self.out_len)
    }

    fn hasher(&self) -> Box<dyn StreamHasher> {
        Box::new(Blake3Stream {
            hasher: Blake3Hasher::new(),
            out_len: self.out_len,
        })
    }
}

struct Blake3Stream {
    hasher: Blake3Hasher,
    out_len: usize,
}

impl StreamHasher for Blake3Stream {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        blake3_output(&self.hasher, self.out_len)
    }
}

fn blake3_output(hasher: &Blake3Hasher, out_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; out_len];
    hasher.finalize_xof().fill(&mut out);
    out
}
