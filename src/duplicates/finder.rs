//! Duplicate finder: the pipeline orchestrator.
//!
//! # Overview
//!
//! [`DuplicateFinder::find_duplicates`] validates and canonicalizes the
//! roots, computes their common ancestor and then runs four steps:
//!
//! 1. **Collect candidates**: walk the roots and bucket files by size
//! 2. **Staged hashing**: prefix checksum, prefix digest, full checksum
//! 3. **Build tree**: annotate the tree under the common ancestor
//! 4. **Extract duplicates**: breadth-first emission of the final map
//!
//! Each step publishes `Starting <step>` and
//! `Completed <step> in N ms. Total items: K` to the event sink and is
//! recorded in [`ScanSummary::steps`].
//!
//! # Example
//!
//! ```no_run
//! use dupetree::duplicates::{DuplicateFinder, FinderConfig};
//! use std::path::PathBuf;
//!
//! let finder = DuplicateFinder::new(FinderConfig::default().with_io_threads(4));
//! let roots = vec![PathBuf::from("/home/user/Photos"), PathBuf::from("/mnt/backup/Photos")];
//! let (map, summary) = finder.find_duplicates(&roots)?;
//!
//! for (key, paths) in &map {
//!     println!("{}: {:?}", key, paths);
//! }
//! println!("{} bytes hashed", summary.bytes_hashed);
//! # Ok::<(), dupetree::duplicates::FinderError>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::extract::{extract_from_dir, ExtractError};
use super::groups::DuplicateMap;
use super::run_in_pool;
use super::staged::{StageOutcome, StagedHasher};
use crate::events::{default_sink, EventSink};
use crate::scanner::{collect_candidates, common_ancestor, HasherConfig, WalkerConfig};
use crate::stats::{NoopStats, StatsCollector};
use crate::tree::{DuplicateIndex, TreeBuilder, TreeError, DIR_KEY_PREFIX};

/// Configuration for the duplicate finder.
#[derive(Clone)]
pub struct FinderConfig {
    /// Number of I/O threads for hashing and tree construction.
    /// Default is 4 to prevent disk thrashing.
    pub io_threads: usize,
    /// Walker configuration; the root filter is filled in from the roots.
    pub walker_config: WalkerConfig,
    /// Hasher algorithms and tier boundaries.
    pub hasher_config: HasherConfig,
    /// Destination for stage and per-item events.
    pub event_sink: Arc<dyn EventSink>,
    /// Receiver of per-file hashing records.
    pub stats_collector: Arc<dyn StatsCollector>,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("io_threads", &self.io_threads)
            .field("walker_config", &self.walker_config)
            .field("hasher_config", &self.hasher_config)
            .field("event_sink", &"<sink>")
            .field("stats_collector", &"<collector>")
            .field("shutdown_flag", &self.shutdown_flag)
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            walker_config: WalkerConfig::default(),
            hasher_config: HasherConfig::default(),
            event_sink: default_sink(),
            stats_collector: Arc::new(NoopStats),
            shutdown_flag: None,
        }
    }
}

impl FinderConfig {
    /// Set the number of I/O threads.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Set the hasher configuration.
    #[must_use]
    pub fn with_hasher_config(mut self, config: HasherConfig) -> Self {
        self.hasher_config = config;
        self
    }

    /// Set the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Set the statistics collector.
    #[must_use]
    pub fn with_stats_collector(mut self, stats: Arc<dyn StatsCollector>) -> Self {
        self.stats_collector = stats;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Timing of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStats {
    /// Step name
    pub name: String,
    /// Wall time
    pub elapsed: Duration,
    /// Items produced by the step
    pub items: usize,
}

/// Summary statistics from a duplicate scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    /// Canonical scan roots
    pub roots: Vec<PathBuf>,
    /// Their common ancestor (the tree root)
    pub common_ancestor: PathBuf,
    /// Eligible files found
    pub total_files: usize,
    /// Total size of eligible files in bytes
    pub total_size: u64,
    /// Files sharing their size with another file
    pub candidates: usize,
    /// Files eliminated because their size was unique
    pub eliminated_by_size: usize,
    /// Per-pass results of the staged hasher
    pub hash_stages: Vec<StageOutcome>,
    /// Confirmed duplicate file groups before extraction
    pub confirmed_groups: usize,
    /// Directory units in the final map
    pub duplicate_directories: usize,
    /// File paths listed under file keys in the final map
    pub duplicate_files: usize,
    /// Total size of the emitted directory units
    pub duplicate_directory_bytes: u64,
    /// Entries skipped because of access errors
    pub skipped_items: usize,
    /// Bytes read by the staged hasher
    pub bytes_hashed: u64,
    /// Step timings in execution order
    pub steps: Vec<StepStats>,
    /// Duration of the entire scan
    pub scan_duration: Duration,
}

impl ScanSummary {
    /// Files eliminated by a hash pass, in pass order.
    #[must_use]
    pub fn eliminated_by_hashing(&self) -> usize {
        self.hash_stages.iter().map(|s| s.eliminated).sum()
    }

    /// Whether any item was skipped.
    #[must_use]
    pub fn has_skipped_items(&self) -> bool {
        self.skipped_items > 0
    }
}

/// Errors that can occur during duplicate finding.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// No roots were given.
    #[error("No scan roots given")]
    NoRoots,

    /// The scan was interrupted by user (Ctrl+C or shutdown signal).
    #[error("Scan interrupted by user")]
    Interrupted,

    /// The provided path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The provided path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The roots share no common ancestor.
    #[error("Scan roots share no common ancestor")]
    NoCommonAncestor,

    /// An I/O error occurred while resolving a root.
    #[error("I/O error for {path}: {source}")]
    IoWithPath {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The tree could not be built.
    #[error(transparent)]
    Tree(TreeError),

    /// The annotated tree broke the extraction contract.
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl From<TreeError> for FinderError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::Interrupted => Self::Interrupted,
            other => Self::Tree(other),
        }
    }
}

/// Duplicate finder that orchestrates the detection pipeline.
#[derive(Debug)]
pub struct DuplicateFinder {
    config: FinderConfig,
}

impl DuplicateFinder {
    /// Create a new duplicate finder with the given configuration.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    /// Create a new duplicate finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Find duplicate files and directories under `roots`.
    ///
    /// # Returns
    ///
    /// A tuple of:
    /// - [`DuplicateMap`] - key to sorted paths, possibly empty
    /// - [`ScanSummary`] - statistics about the scan
    ///
    /// # Errors
    ///
    /// Returns [`FinderError`] if:
    /// - `roots` is empty, a root is missing or not a directory
    /// - the roots share no common ancestor
    /// - the scan is interrupted by the shutdown flag
    /// - the tree or extraction contract is violated
    pub fn find_duplicates(
        &self,
        roots: &[PathBuf],
    ) -> Result<(DuplicateMap, ScanSummary), FinderError> {
        let start_time = Instant::now();
        let sink = Arc::clone(&self.config.event_sink);

        let roots = resolve_roots(roots)?;
        let ancestor = common_ancestor(&roots).ok_or(FinderError::NoCommonAncestor)?;
        log::debug!(
            "Scanning {} root(s) under common ancestor {}",
            roots.len(),
            ancestor.display()
        );

        let mut summary = ScanSummary {
            roots: roots.clone(),
            common_ancestor: ancestor.clone(),
            ..Default::default()
        };

        let walker_config = self
            .config
            .walker_config
            .clone()
            .with_root_filter(roots.clone());

        // Step 1
        let collected = self.step("collect candidates", &mut summary, |_| {
            let outcome = collect_candidates(
                &roots,
                &walker_config,
                sink.as_ref(),
                self.config.shutdown_flag.as_ref(),
            );
            let items = outcome.stats.potential_duplicates;
            Ok((outcome, items))
        })?;
        summary.total_files = collected.stats.total_files;
        summary.total_size = collected.stats.total_size;
        summary.candidates = collected.stats.potential_duplicates;
        summary.eliminated_by_size = collected.stats.eliminated_unique;
        summary.skipped_items += collected.skipped;

        // Step 2
        let confirmed = self.step("staged hashing", &mut summary, |summary| {
            let mut hasher = StagedHasher::new(self.config.hasher_config.clone())
                .with_io_threads(self.config.io_threads)
                .with_event_sink(Arc::clone(&sink))
                .with_stats_collector(Arc::clone(&self.config.stats_collector));
            if let Some(flag) = &self.config.shutdown_flag {
                hasher = hasher.with_shutdown_flag(Arc::clone(flag));
            }

            let (confirmed, stats) = hasher.refine(collected.buckets);
            if stats.interrupted {
                return Err(FinderError::Interrupted);
            }
            summary.bytes_hashed = stats.bytes_read();
            summary.skipped_items += stats.failed_files();
            summary.confirmed_groups = stats.confirmed_groups;
            summary.hash_stages = stats.stages;
            let items = stats.confirmed_files;
            Ok((confirmed, items))
        })?;

        // Step 3
        let tree = self.step("build tree", &mut summary, |summary| {
            let mut builder = TreeBuilder::new(
                DuplicateIndex::from_groups(&confirmed),
                roots.clone(),
                self.config.walker_config.ignored_names.clone(),
                Arc::clone(&sink),
            )
            .with_ignore_patterns(&self.config.walker_config.ignore_patterns);
            if let Some(flag) = &self.config.shutdown_flag {
                builder = builder.with_shutdown_flag(Arc::clone(flag));
            }

            let tree = run_in_pool(self.config.io_threads, || builder.build(&ancestor))?;
            summary.skipped_items += builder.read_failures();
            let items = tree.descendant_count();
            Ok((tree, items))
        })?;

        // Step 4
        let map = self.step("extract duplicates", &mut summary, |summary| {
            let (map, stats) = extract_from_dir(&tree, &roots)?;
            summary.duplicate_directories = stats.directories_emitted;
            summary.duplicate_files = stats.files_emitted;
            summary.duplicate_directory_bytes = stats.directory_bytes;
            let items = map.len();
            Ok((map, items))
        })?;

        summary.scan_duration = start_time.elapsed();
        log::info!(
            "Scan complete: {} directory groups, {} file groups in {:.2}s",
            map.keys().filter(|k| k.starts_with(DIR_KEY_PREFIX)).count(),
            map.keys().filter(|k| !k.starts_with(DIR_KEY_PREFIX)).count(),
            summary.scan_duration.as_secs_f64()
        );

        Ok((map, summary))
    }

    /// Run one named step, publishing its boundaries and recording its timing.
    fn step<T>(
        &self,
        name: &str,
        summary: &mut ScanSummary,
        op: impl FnOnce(&mut ScanSummary) -> Result<(T, usize), FinderError>,
    ) -> Result<T, FinderError> {
        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        let sink = &self.config.event_sink;
        sink.info(&format!("Starting {}", name));
        let start = Instant::now();

        let (value, items) = op(summary)?;
        let elapsed = start.elapsed();

        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        sink.info(&format!(
            "Completed {} in {} ms. Total items: {}",
            name,
            elapsed.as_millis(),
            items
        ));
        summary.steps.push(StepStats {
            name: name.to_string(),
            elapsed,
            items,
        });
        Ok(value)
    }
}

/// Validate, canonicalize, sort and de-duplicate the roots.
fn resolve_roots(roots: &[PathBuf]) -> Result<Vec<PathBuf>, FinderError> {
    if roots.is_empty() {
        return Err(FinderError::NoRoots);
    }

    let mut resolved = Vec::with_capacity(roots.len());
    for root in roots {
        resolved.push(resolve_root(root)?);
    }
    resolved.sort();
    resolved.dedup();
    Ok(resolved)
}

fn resolve_root(root: &Path) -> Result<PathBuf, FinderError> {
    if !root.exists() {
        return Err(FinderError::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(FinderError::NotADirectory(root.to_path_buf()));
    }
    root.canonicalize().map_err(|source| FinderError::IoWithPath {
        path: root.to_path_buf(),
        source,
    })
}
