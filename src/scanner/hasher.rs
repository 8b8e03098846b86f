//! Adaptive content hashing with streaming and memory-mapped reads.
//!
//! # Overview
//!
//! [`ContentHasher`] computes one digest per call over either the adaptive
//! prefix of a file or its full content. The prefix length depends on the
//! file's size tier (see [`FileSizeTier`]):
//!
//! - **Tiny** files (up to 16 KiB) are read in full,
//! - **Medium** files (below 100 MiB) contribute a 16 KiB prefix,
//! - **Large** files contribute an 8 MiB prefix.
//!
//! Full-file reads above the memory-map threshold go through `memmap2`;
//! everything else streams through a fixed buffer and checks the shutdown
//! flag between chunks.
//!
//! # Example
//!
//! ```no_run
//! use dupetree::scanner::{ContentHasher, HasherConfig};
//! use dupetree::stats::HashStage;
//! use std::path::Path;
//!
//! let hasher = ContentHasher::new(HasherConfig::default());
//! let out = hasher.hash_stage(Path::new("photo.jpg"), 2048, HashStage::PrefixChecksum)?;
//! println!("{} ({} bytes read)", out.digest, out.bytes_read);
//! # Ok::<(), dupetree::scanner::HashError>(())
//! ```

use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use memmap2::MmapOptions;
use sha2::{Digest as _, Sha256, Sha512};
use twox_hash::{XxHash32, XxHash64};

use super::HashError;
use crate::stats::{HashStage, ReadMode};

/// Files up to this size are hashed in full even in prefix stages.
pub const TINY_FILE_LIMIT: u64 = 16 * 1024;

/// Prefix length for medium files.
pub const MEDIUM_PREFIX: u64 = 16 * 1024;

/// Files at or above this size are in the large tier.
pub const LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Prefix length for large files.
pub const LARGE_PREFIX: u64 = 8 * 1024 * 1024;

/// Full reads of files at or above this size are memory-mapped.
pub const MMAP_THRESHOLD: u64 = 64 * 1024 * 1024;

const BUFFER_SIZE: usize = 64 * 1024;

/// Non-cryptographic checksum used by the first and third passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FastChecksum {
    /// 64-bit xxHash
    #[default]
    Xxh64,
    /// 32-bit xxHash
    Xxh32,
}

impl FastChecksum {
    /// Parse a configured algorithm name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "xxh64" | "xxhash64" => Some(Self::Xxh64),
            "xxh32" | "xxhash32" => Some(Self::Xxh32),
            _ => None,
        }
    }

    /// Canonical name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Xxh64 => "xxh64",
            Self::Xxh32 => "xxh32",
        }
    }
}

/// Cryptographic digest used by the second pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CryptoDigest {
    /// SHA-256
    #[default]
    Sha256,
    /// SHA-512
    Sha512,
}

impl CryptoDigest {
    /// Parse a configured algorithm name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Canonical name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

/// Size class that decides how much of a file the prefix stages read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSizeTier {
    /// Read in full
    Tiny,
    /// Kilobyte-scale prefix
    Medium,
    /// Megabyte-scale prefix
    Large,
}

/// Tunables for [`ContentHasher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasherConfig {
    /// Checksum for passes one and three
    pub fast_checksum: FastChecksum,
    /// Digest for pass two
    pub digest: CryptoDigest,
    /// Upper bound (inclusive) of the tiny tier
    pub tiny_file_limit: u64,
    /// Prefix length for medium files
    pub medium_prefix: u64,
    /// Lower bound (inclusive) of the large tier
    pub large_file_threshold: u64,
    /// Prefix length for large files
    pub large_prefix: u64,
    /// Full reads at or above this size use a memory map
    pub mmap_threshold: u64,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            fast_checksum: FastChecksum::default(),
            digest: CryptoDigest::default(),
            tiny_file_limit: TINY_FILE_LIMIT,
            medium_prefix: MEDIUM_PREFIX,
            large_file_threshold: LARGE_FILE_THRESHOLD,
            large_prefix: LARGE_PREFIX,
            mmap_threshold: MMAP_THRESHOLD,
        }
    }
}

impl HasherConfig {
    /// Set the fast checksum algorithm.
    #[must_use]
    pub fn with_fast_checksum(mut self, algo: FastChecksum) -> Self {
        self.fast_checksum = algo;
        self
    }

    /// Set the cryptographic digest algorithm.
    #[must_use]
    pub fn with_digest(mut self, algo: CryptoDigest) -> Self {
        self.digest = algo;
        self
    }

    /// Set the memory-map threshold.
    #[must_use]
    pub fn with_mmap_threshold(mut self, threshold: u64) -> Self {
        self.mmap_threshold = threshold;
        self
    }

    /// Set the tier boundaries and prefix lengths.
    ///
    /// # Arguments
    ///
    /// * `tiny_limit` - Largest size still read in full
    /// * `medium_prefix` - Prefix for medium files
    /// * `large_threshold` - Smallest size in the large tier
    /// * `large_prefix` - Prefix for large files
    #[must_use]
    pub fn with_tiers(
        mut self,
        tiny_limit: u64,
        medium_prefix: u64,
        large_threshold: u64,
        large_prefix: u64,
    ) -> Self {
        self.tiny_file_limit = tiny_limit;
        self.medium_prefix = medium_prefix.max(1);
        self.large_file_threshold = large_threshold;
        self.large_prefix = large_prefix.max(1);
        self
    }

    /// Tier of a file with `size` bytes.
    #[must_use]
    pub fn tier(&self, size: u64) -> FileSizeTier {
        if size <= self.tiny_file_limit {
            FileSizeTier::Tiny
        } else if size < self.large_file_threshold {
            FileSizeTier::Medium
        } else {
            FileSizeTier::Large
        }
    }

    /// Number of bytes the prefix stages read from a file of `size` bytes.
    #[must_use]
    pub fn prefix_len(&self, size: u64) -> u64 {
        match self.tier(size) {
            FileSizeTier::Tiny => size,
            FileSizeTier::Medium => self.medium_prefix.min(size),
            FileSizeTier::Large => self.large_prefix.min(size),
        }
    }

    /// Number of bytes `stage` reads from a file of `size` bytes.
    #[must_use]
    pub fn read_len(&self, size: u64, stage: HashStage) -> u64 {
        match stage.read_mode() {
            ReadMode::InitialSegment => self.prefix_len(size),
            ReadMode::FullFile => size,
        }
    }
}

/// Digest produced by one hash attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashOutput {
    /// Lowercase hex digest
    pub digest: String,
    /// Bytes consumed to produce it
    pub bytes_read: u64,
}

enum Accumulator {
    Xxh64(XxHash64),
    Xxh32(XxHash32),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Accumulator {
    fn fast(algo: FastChecksum) -> Self {
        match algo {
            FastChecksum::Xxh64 => Self::Xxh64(XxHash64::with_seed(0)),
            FastChecksum::Xxh32 => Self::Xxh32(XxHash32::with_seed(0)),
        }
    }

    fn crypto(algo: CryptoDigest) -> Self {
        match algo {
            CryptoDigest::Sha256 => Self::Sha256(Sha256::new()),
            CryptoDigest::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Xxh64(h) => h.write(bytes),
            Self::Xxh32(h) => h.write(bytes),
            Self::Sha256(h) => h.update(bytes),
            Self::Sha512(h) => h.update(bytes),
        }
    }

    fn finish_hex(self) -> String {
        match self {
            Self::Xxh64(h) => format!("{:016x}", h.finish()),
            Self::Xxh32(h) => format!("{:08x}", h.finish()),
            Self::Sha256(h) => format!("{:x}", h.finalize()),
            Self::Sha512(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Streaming file hasher for the three refinement stages.
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    config: HasherConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl ContentHasher {
    /// Create a hasher with the given configuration.
    #[must_use]
    pub fn new(config: HasherConfig) -> Self {
        Self {
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag checked between read chunks.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &HasherConfig {
        &self.config
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn accumulator_for(&self, stage: HashStage) -> Accumulator {
        match stage {
            HashStage::PrefixChecksum | HashStage::FullChecksum => {
                Accumulator::fast(self.config.fast_checksum)
            }
            HashStage::PrefixDigest => Accumulator::crypto(self.config.digest),
        }
    }

    /// Hash the part of `path` that `stage` covers.
    ///
    /// `size` is the size observed when the file was collected; the read
    /// stops there even if the file has grown since.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read, or
    /// [`HashError::Interrupted`] if shutdown was requested mid-read.
    pub fn hash_stage(
        &self,
        path: &Path,
        size: u64,
        stage: HashStage,
    ) -> Result<HashOutput, HashError> {
        let limit = self.config.read_len(size, stage);
        let mut acc = self.accumulator_for(stage);

        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;

        let bytes_read = if stage.read_mode() == ReadMode::FullFile
            && limit > 0
            && limit >= self.config.mmap_threshold
        {
            self.feed_mapped(&file, path, limit, &mut acc)?
        } else {
            self.feed_stream(file, path, limit, &mut acc)?
        };

        Ok(HashOutput {
            digest: acc.finish_hex(),
            bytes_read,
        })
    }

    fn feed_stream(
        &self,
        file: File,
        path: &Path,
        limit: u64,
        acc: &mut Accumulator,
    ) -> Result<u64, HashError> {
        let mut reader = file.take(limit);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut total = 0u64;

        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            acc.update(&buffer[..n]);
            total += n as u64;
        }

        Ok(total)
    }

    fn feed_mapped(
        &self,
        file: &File,
        path: &Path,
        limit: u64,
        acc: &mut Accumulator,
    ) -> Result<u64, HashError> {
        let len = usize::try_from(limit).map_err(|_| HashError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "file too large to map"),
        })?;

        // SAFETY: the file is opened read-only and the map is dropped before
        // returning. Concurrent truncation by another process can still fault;
        // that is accepted for a read-only scan of a quiescent tree.
        let map = unsafe { MmapOptions::new().len(len).map(file) }
            .map_err(|e| HashError::from_io(path, e))?;

        for chunk in map.chunks(BUFFER_SIZE * 16) {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            acc.update(chunk);
        }

        log::trace!("Mapped {} bytes of {}", len, path.display());
        Ok(len as u64)
    }
}

/// Hex digest of an in-memory buffer with the fast checksum.
#[must_use]
pub fn fast_checksum_bytes(algo: FastChecksum, bytes: &[u8]) -> String {
    let mut acc = Accumulator::fast(algo);
    acc.update(bytes);
    acc.finish_hex()
}

/// Hex digest of an in-memory buffer with the cryptographic digest.
#[must_use]
pub fn crypto_digest_bytes(algo: CryptoDigest, bytes: &[u8]) -> String {
    let mut acc = Accumulator::crypto(algo);
    acc.update(bytes);
    acc.finish_hex()
}
