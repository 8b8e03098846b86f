//! Size grouping and the group maps passed between pipeline stages.
//!
//! # Overview
//!
//! Size grouping is the first elimination step: files with different sizes
//! cannot be duplicates, so only sizes shared by two or more files survive.
//! Buckets are ordered by size and each bucket's paths are sorted and
//! de-duplicated, so overlapping roots never count a file twice and the
//! result does not depend on walk order.
//!
//! # Example
//!
//! ```
//! use dupetree::scanner::FileEntry;
//! use dupetree::duplicates::group_by_size;
//! use std::path::PathBuf;
//!
//! let files = vec![
//!     FileEntry::new(PathBuf::from("/file1.txt"), 1024),
//!     FileEntry::new(PathBuf::from("/file2.txt"), 1024),
//!     FileEntry::new(PathBuf::from("/file3.txt"), 2048),
//! ];
//!
//! let (buckets, stats) = group_by_size(files);
//!
//! assert_eq!(stats.total_files, 3);
//! assert_eq!(stats.potential_duplicates, 2);
//! assert_eq!(buckets.len(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Serialize;

use crate::scanner::FileEntry;

/// Exact byte size to the eligible paths of that size (two or more each).
pub type SizeBuckets = BTreeMap<u64, Vec<PathBuf>>;

/// Confirmed content key to the paths sharing that content.
pub type ConfirmedGroups = BTreeMap<String, Vec<PathBuf>>;

/// Final report: duplicate key to sorted absolute paths.
///
/// Keys starting with `file:` name a set of identical files and always have
/// at least two paths. Keys starting with `dir:` name a set of directories
/// whose whole content is duplicated elsewhere.
pub type DuplicateMap = BTreeMap<String, Vec<PathBuf>>;

/// Statistics from size grouping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupingStats {
    /// Distinct files processed
    pub total_files: usize,
    /// Total size of those files in bytes
    pub total_size: u64,
    /// Number of distinct sizes seen
    pub unique_sizes: usize,
    /// Files in buckets of two or more
    pub potential_duplicates: usize,
    /// Files dropped because their size was unique
    pub eliminated_unique: usize,
    /// Zero-length files dropped
    pub empty_files: usize,
    /// Paths reported more than once (overlapping roots)
    pub repeated_paths: usize,
    /// Buckets with two or more files
    pub size_groups: usize,
}

impl GroupingStats {
    /// Percentage of files eliminated by size grouping.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.eliminated_unique as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Group files by exact size, keeping only sizes shared by two or more files.
///
/// Zero-length entries are dropped here as well so the invariant holds even
/// for callers that bypass the walker.
///
/// # Arguments
///
/// * `files` - Entries produced by the walker
///
/// # Returns
///
/// A tuple of:
/// - [`SizeBuckets`] with sorted, de-duplicated paths
/// - [`GroupingStats`] describing the elimination
#[must_use]
pub fn group_by_size(files: impl IntoIterator<Item = FileEntry>) -> (SizeBuckets, GroupingStats) {
    let mut all: BTreeMap<u64, BTreeSet<PathBuf>> = BTreeMap::new();
    let mut stats = GroupingStats::default();

    for file in files {
        if file.size == 0 {
            stats.empty_files += 1;
            continue;
        }
        let size = file.size;
        if all.entry(size).or_default().insert(file.path) {
            stats.total_files += 1;
            stats.total_size += size;
        } else {
            stats.repeated_paths += 1;
        }
    }

    stats.unique_sizes = all.len();

    let mut buckets = SizeBuckets::new();
    for (size, paths) in all {
        if paths.len() < 2 {
            stats.eliminated_unique += paths.len();
            continue;
        }
        stats.potential_duplicates += paths.len();
        stats.size_groups += 1;
        buckets.insert(size, paths.into_iter().collect());
    }

    log::debug!(
        "Size grouping: {} files, {} size groups, {:.1}% eliminated",
        stats.total_files,
        stats.size_groups,
        stats.elimination_rate()
    );

    (buckets, stats)
}
