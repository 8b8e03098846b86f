//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Size-based candidate grouping (step 1)
//! - Staged hashing: prefix checksum, prefix digest, full checksum (step 2)
//! - Breadth-first extraction of directory and file units (step 4)
//! - The [`DuplicateFinder`] orchestrator that sequences every step
//!
//! Tree construction (step 3) lives in [`crate::tree`].

pub mod extract;
pub mod finder;
pub mod groups;
pub mod staged;

pub use extract::{
    extract_duplicates, extract_duplicates_with_stats, extract_from_dir, ExtractError,
    ExtractStats,
};
pub use finder::{DuplicateFinder, FinderConfig, FinderError, ScanSummary, StepStats};
pub use groups::{group_by_size, ConfirmedGroups, DuplicateMap, GroupingStats, SizeBuckets};
pub use staged::{RefineStats, StageOutcome, StagedHasher};

/// Run `op` on a dedicated pool of `threads` I/O workers.
///
/// Falls back to the global rayon pool if the dedicated pool cannot be
/// created.
pub(crate) fn run_in_pool<R: Send>(threads: usize, op: impl FnOnce() -> R + Send) -> R {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
    {
        Ok(pool) => pool.install(op),
        Err(e) => {
            log::warn!("Failed to create I/O thread pool, using global pool: {}", e);
            op()
        }
    }
}
