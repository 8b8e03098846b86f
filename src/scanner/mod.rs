//! Scanner module: candidate discovery and content hashing.
//!
//! This module provides functionality for:
//! - Parallel directory walking using jwalk, with junk and access filtering
//! - Adaptive prefix and full-content hashing (xxHash and SHA-2)
//! - Component-wise path helpers
//!
//! # Architecture
//!
//! - [`walker`]: eligibility rules and traversal of one root
//! - [`hasher`]: the per-stage content hasher
//! - [`path_utils`]: common ancestor and nesting checks
//!
//! [`collect_candidates`] ties the walker to size grouping and is the first
//! stage of the duplicate pipeline.
//!
//! # Example
//!
//! ```no_run
//! use dupetree::events::LogSink;
//! use dupetree::scanner::{collect_candidates, WalkerConfig};
//! use std::path::PathBuf;
//!
//! let roots = vec![PathBuf::from("/srv/a"), PathBuf::from("/srv/b")];
//! let outcome = collect_candidates(&roots, &WalkerConfig::default(), &LogSink, None);
//! for (size, paths) in &outcome.buckets {
//!     println!("{} bytes: {} candidates", size, paths.len());
//! }
//! ```

pub mod hasher;
pub mod path_utils;
pub mod walker;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::duplicates::{group_by_size, GroupingStats, SizeBuckets};
use crate::events::EventSink;

pub use hasher::{
    ContentHasher, CryptoDigest, FastChecksum, FileSizeTier, HashOutput, HasherConfig,
};
pub use path_utils::common_ancestor;
pub use walker::Walker;

/// Names skipped everywhere by default: OS metadata artifacts.
pub const DEFAULT_IGNORED_NAMES: &[&str] = &[
    ".DS_Store",
    ".Spotlight-V100",
    ".fseventsd",
    ".Trashes",
    "Thumbs.db",
    "desktop.ini",
    ".localized",
];

/// Owned copy of [`DEFAULT_IGNORED_NAMES`].
#[must_use]
pub fn default_ignored_names() -> Vec<String> {
    DEFAULT_IGNORED_NAMES.iter().map(|s| (*s).to_string()).collect()
}

/// An eligible file found by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Size in bytes observed during the walk
    pub size: u64,
}

impl FileEntry {
    /// Create a new FileEntry.
    #[must_use]
    pub fn new(path: PathBuf, size: u64) -> Self {
        Self { path, size }
    }
}

/// Eligibility rules for the candidate walk.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    pub follow_symlinks: bool,

    /// Exact file or directory names to skip (OS metadata artifacts).
    pub ignored_names: Vec<String>,

    /// Gitignore-style patterns to skip.
    pub ignore_patterns: Vec<String>,

    /// Only keep files this process could also modify.
    pub require_writable: bool,

    /// When non-empty, only files nested under one of these paths are kept.
    pub root_filter: Vec<PathBuf>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            ignored_names: default_ignored_names(),
            ignore_patterns: Vec::new(),
            require_writable: true,
            root_filter: Vec::new(),
        }
    }
}

impl WalkerConfig {
    /// Set whether symbolic links are followed.
    #[must_use]
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Replace the ignored artifact names.
    #[must_use]
    pub fn with_ignored_names(mut self, names: Vec<String>) -> Self {
        self.ignored_names = names;
        self
    }

    /// Set the gitignore-style ignore patterns.
    #[must_use]
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Set whether read-only files are excluded.
    #[must_use]
    pub fn with_require_writable(mut self, require: bool) -> Self {
        self.require_writable = require;
        self
    }

    /// Restrict accepted files to those nested under `roots`.
    #[must_use]
    pub fn with_root_filter(mut self, roots: Vec<PathBuf>) -> Self {
        self.root_filter = roots;
        self
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Shutdown was requested while the file was being read.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl HashError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// Result of the candidate collection stage.
#[derive(Debug, Default)]
pub struct CollectOutcome {
    /// Size buckets with at least two members
    pub buckets: SizeBuckets,
    /// Grouping statistics
    pub stats: GroupingStats,
    /// Entries skipped because of access errors
    pub skipped: usize,
}

/// Walk every root and group the eligible files by exact size.
///
/// Per-entry failures are published to `sink` at error level and counted
/// in [`CollectOutcome::skipped`]; they never abort the collection.
///
/// # Arguments
///
/// * `roots` - Directories to walk
/// * `config` - Eligibility rules shared by every root
/// * `sink` - Destination for skipped-entry events
/// * `shutdown` - Optional flag that stops the walk early
pub fn collect_candidates(
    roots: &[PathBuf],
    config: &WalkerConfig,
    sink: &dyn EventSink,
    shutdown: Option<&Arc<AtomicBool>>,
) -> CollectOutcome {
    let mut files = Vec::new();
    let mut skipped = 0usize;

    for root in roots {
        let mut walker = Walker::new(root, config.clone());
        if let Some(flag) = shutdown {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }

        for entry in walker.walk() {
            match entry {
                Ok(file) => files.push(file),
                Err(e) => {
                    skipped += 1;
                    sink.error(&format!("Skipping entry: {}", e));
                }
            }
        }
    }

    let (buckets, stats) = group_by_size(files);
    sink.debug(&format!(
        "Collected {} files into {} size buckets ({} candidates)",
        stats.total_files, stats.size_groups, stats.potential_duplicates
    ));

    CollectOutcome {
        buckets,
        stats,
        skipped,
    }
}
