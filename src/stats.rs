//! Per-file hashing statistics.
//!
//! # Overview
//!
//! The staged hasher reports every hash attempt to a [`StatsCollector`]
//! exactly once. Collectors are side-effect only: nothing they do can
//! change which files end up grouped together.
//!
//! [`StageStatistics`] aggregates attempts per (size bin, stage) and can
//! render a plain-text table for the `--stats` flag.
//!
//! # Example
//!
//! ```
//! use dupetree::stats::{FileRecord, HashStage, StageStatistics, StatsCollector};
//! use std::path::PathBuf;
//! use std::time::Duration;
//!
//! let stats = StageStatistics::new();
//! stats.record_file_processed(&FileRecord {
//!     path: PathBuf::from("/data/a.bin"),
//!     file_size: 4096,
//!     bytes_read: 4096,
//!     elapsed: Duration::from_millis(2),
//!     stage: HashStage::PrefixChecksum,
//!     success: true,
//! });
//!
//! assert_eq!(stats.bytes_read(HashStage::PrefixChecksum), 4096);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytesize::ByteSize;
use serde::Serialize;

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * MB;

/// How much of a file a stage reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Only the size-dependent prefix.
    InitialSegment,
    /// The whole file.
    FullFile,
}

/// One of the three refinement passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HashStage {
    /// Fast checksum over the adaptive prefix.
    PrefixChecksum,
    /// Cryptographic digest over the adaptive prefix.
    PrefixDigest,
    /// Fast checksum over the whole file.
    FullChecksum,
}

impl HashStage {
    /// All stages in execution order.
    pub const ALL: [HashStage; 3] = [
        HashStage::PrefixChecksum,
        HashStage::PrefixDigest,
        HashStage::FullChecksum,
    ];

    /// The read mode used by this stage.
    #[must_use]
    pub fn read_mode(self) -> ReadMode {
        match self {
            Self::PrefixChecksum | Self::PrefixDigest => ReadMode::InitialSegment,
            Self::FullChecksum => ReadMode::FullFile,
        }
    }

    /// Short label used in logs and tables.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::PrefixChecksum => "prefix-checksum",
            Self::PrefixDigest => "prefix-digest",
            Self::FullChecksum => "full-checksum",
        }
    }
}

impl fmt::Display for HashStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single hash attempt.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    /// File that was hashed
    pub path: PathBuf,
    /// Size of the file in bytes
    pub file_size: u64,
    /// Bytes actually read for this attempt
    pub bytes_read: u64,
    /// Wall time spent on this attempt
    pub elapsed: Duration,
    /// Stage that made the attempt
    pub stage: HashStage,
    /// Whether the attempt produced a digest
    pub success: bool,
}

/// Receiver of per-file hashing records.
pub trait StatsCollector: Send + Sync {
    /// Record one hash attempt.
    fn record_file_processed(&self, record: &FileRecord);
}

/// Collector that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StatsCollector for NoopStats {
    fn record_file_processed(&self, _record: &FileRecord) {}
}

/// File size bins used in the statistics table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SizeBin {
    /// Below 1 MiB
    Small,
    /// 1 MiB up to 100 MiB
    Medium,
    /// 100 MiB up to 1 GiB
    Large,
    /// 1 GiB and above
    Huge,
}

impl SizeBin {
    /// Bin for a file of `size` bytes.
    #[must_use]
    pub fn for_size(size: u64) -> Self {
        if size < MB {
            Self::Small
        } else if size < 100 * MB {
            Self::Medium
        } else if size < GB {
            Self::Large
        } else {
            Self::Huge
        }
    }

    /// Human-readable bin label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Small => "<1MB",
            Self::Medium => "1MB-100MB",
            Self::Large => "100MB-1GB",
            Self::Huge => "1GB+",
        }
    }
}

/// Aggregated numbers for one (bin, stage) cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTotals {
    /// Attempts recorded
    pub files: u64,
    /// Attempts that failed
    pub failures: u64,
    /// Bytes read
    pub bytes_read: u64,
    /// Total time spent
    pub elapsed: Duration,
}

/// Binned statistics collector.
#[derive(Debug, Default)]
pub struct StageStatistics {
    cells: Mutex<BTreeMap<(SizeBin, HashStage), StageTotals>>,
}

impl StageStatistics {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all non-empty cells.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<(SizeBin, HashStage), StageTotals> {
        self.cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Total bytes read by a stage across all bins.
    #[must_use]
    pub fn bytes_read(&self, stage: HashStage) -> u64 {
        self.totals_for(stage).bytes_read
    }

    /// Totals for one stage across all bins.
    #[must_use]
    pub fn totals_for(&self, stage: HashStage) -> StageTotals {
        self.cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((_, s), _)| *s == stage)
            .fold(StageTotals::default(), |mut acc, (_, t)| {
                acc.files += t.files;
                acc.failures += t.failures;
                acc.bytes_read += t.bytes_read;
                acc.elapsed += t.elapsed;
                acc
            })
    }

    /// Render the collected numbers as a fixed-width table.
    #[must_use]
    pub fn render_table(&self) -> String {
        let cells = self.snapshot();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<11} {:<16} {:>8} {:>8} {:>12} {:>10}",
            "size", "stage", "files", "failed", "read", "time(ms)"
        );
        if cells.is_empty() {
            let _ = writeln!(out, "(no files hashed)");
            return out;
        }
        for ((bin, stage), totals) in &cells {
            let _ = writeln!(
                out,
                "{:<11} {:<16} {:>8} {:>8} {:>12} {:>10}",
                bin.label(),
                stage.label(),
                totals.files,
                totals.failures,
                ByteSize::b(totals.bytes_read).to_string(),
                totals.elapsed.as_millis()
            );
        }
        out
    }
}

impl StatsCollector for StageStatistics {
    fn record_file_processed(&self, record: &FileRecord) {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        let cell = cells
            .entry((SizeBin::for_size(record.file_size), record.stage))
            .or_default();
        cell.files += 1;
        if !record.success {
            cell.failures += 1;
        }
        cell.bytes_read += record.bytes_read;
        cell.elapsed += record.elapsed;
    }
}
