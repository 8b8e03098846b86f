//! Three-pass staged hashing of same-size candidates.
//!
//! # Overview
//!
//! Each size bucket is refined by exactly three passes:
//! 1. **Prefix checksum**: fast xxHash over the adaptive prefix
//! 2. **Prefix digest**: SHA-2 over the same prefix
//! 3. **Full checksum**: fast xxHash over the entire content
//!
//! After every pass each group is split by the new digest and groups with a
//! single member are dropped. Splitting happens inside a group's own lineage,
//! so files from different buckets (or different earlier groups) can never
//! be merged by a later pass.
//!
//! A per-file failure removes only that file and is published to the event
//! sink. Every attempt, successful or not, is reported to the statistics
//! collector.
//!
//! # Example
//!
//! ```no_run
//! use dupetree::duplicates::StagedHasher;
//! use dupetree::scanner::{collect_candidates, WalkerConfig};
//! use dupetree::events::LogSink;
//! use std::path::PathBuf;
//!
//! let roots = vec![PathBuf::from(".")];
//! let outcome = collect_candidates(&roots, &WalkerConfig::default(), &LogSink, None);
//! let (confirmed, stats) = StagedHasher::default().refine(outcome.buckets);
//! println!("{} groups confirmed from {} files", confirmed.len(), stats.input_files);
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use rayon::prelude::*;
use serde::Serialize;

use super::groups::{ConfirmedGroups, SizeBuckets};
use super::run_in_pool;
use crate::events::{default_sink, EventSink};
use crate::scanner::{ContentHasher, HashError, HasherConfig};
use crate::stats::{FileRecord, HashStage, NoopStats, StatsCollector};

/// Files sharing a size and every digest computed so far.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Lineage {
    size: u64,
    digests: Vec<String>,
    paths: Vec<PathBuf>,
}

impl Lineage {
    fn key(&self) -> String {
        format!("file:{}-{}", self.size, self.digests.join("-"))
    }
}

/// What happened during one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    /// The pass
    pub stage: HashStage,
    /// Files entering the pass
    pub input_files: usize,
    /// Files hashed successfully
    pub hashed_files: usize,
    /// Files dropped because hashing failed
    pub failed_files: usize,
    /// Files dropped because their digest was unique in their group
    pub eliminated: usize,
    /// Groups leaving the pass
    pub groups: usize,
    /// Bytes read by the pass
    pub bytes_read: u64,
}

/// Statistics from [`StagedHasher::refine`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefineStats {
    /// Files entering the first pass
    pub input_files: usize,
    /// Per-pass results, in execution order
    pub stages: Vec<StageOutcome>,
    /// Groups confirmed after the last pass
    pub confirmed_groups: usize,
    /// Files in confirmed groups
    pub confirmed_files: usize,
    /// Whether refinement stopped because of a shutdown request
    pub interrupted: bool,
}

impl RefineStats {
    /// Bytes read across all passes.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.stages.iter().map(|s| s.bytes_read).sum()
    }

    /// Files that failed to hash in any pass.
    #[must_use]
    pub fn failed_files(&self) -> usize {
        self.stages.iter().map(|s| s.failed_files).sum()
    }

    /// Outcome of a given pass, if it ran.
    #[must_use]
    pub fn stage(&self, stage: HashStage) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

/// Per-file result of one pass.
enum Attempt {
    Hashed { digest: String, bytes: u64 },
    Failed,
    Interrupted,
}

/// Refines size buckets into confirmed duplicate groups.
pub struct StagedHasher {
    hasher: ContentHasher,
    io_threads: usize,
    sink: Arc<dyn EventSink>,
    stats: Arc<dyn StatsCollector>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl std::fmt::Debug for StagedHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedHasher")
            .field("hasher", &self.hasher)
            .field("io_threads", &self.io_threads)
            .field("shutdown_flag", &self.shutdown_flag)
            .finish_non_exhaustive()
    }
}

impl Default for StagedHasher {
    fn default() -> Self {
        Self::new(HasherConfig::default())
    }
}

impl StagedHasher {
    /// Create a staged hasher with default collaborators.
    #[must_use]
    pub fn new(config: HasherConfig) -> Self {
        Self {
            hasher: ContentHasher::new(config),
            io_threads: 4,
            sink: default_sink(),
            stats: Arc::new(NoopStats),
            shutdown_flag: None,
        }
    }

    /// Set the number of I/O threads.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Set the statistics collector.
    #[must_use]
    pub fn with_stats_collector(mut self, stats: Arc<dyn StatsCollector>) -> Self {
        self.stats = stats;
        self
    }

    /// Set the shutdown flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.hasher = self.hasher.with_shutdown_flag(Arc::clone(&flag));
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Run all three passes over `buckets`.
    ///
    /// # Returns
    ///
    /// A tuple of:
    /// - [`ConfirmedGroups`] keyed by `file:<size>-<d1>-<d2>-<d3>`, every
    ///   group holding two or more sorted paths
    /// - [`RefineStats`] describing each pass
    ///
    /// When shutdown is requested the returned groups are empty and
    /// `interrupted` is set.
    #[must_use]
    pub fn refine(&self, buckets: SizeBuckets) -> (ConfirmedGroups, RefineStats) {
        let mut lineages: Vec<Lineage> = buckets
            .into_iter()
            .filter(|(_, paths)| paths.len() > 1)
            .map(|(size, paths)| Lineage {
                size,
                digests: Vec::new(),
                paths,
            })
            .collect();

        let mut stats = RefineStats {
            input_files: lineages.iter().map(|l| l.paths.len()).sum(),
            ..Default::default()
        };

        for stage in HashStage::ALL {
            if lineages.is_empty() {
                break;
            }
            self.sink.debug(&format!(
                "Pass {} started: {} files in {} groups",
                stage,
                lineages.iter().map(|l| l.paths.len()).sum::<usize>(),
                lineages.len()
            ));
            let (next, outcome, interrupted) =
                run_in_pool(self.io_threads, || self.run_stage(lineages, stage));
            self.sink.debug(&format!(
                "Pass {} finished: {} files in, {} eliminated, {} failed, {} groups remain",
                stage, outcome.input_files, outcome.eliminated, outcome.failed_files, outcome.groups
            ));
            stats.stages.push(outcome);
            lineages = next;

            if interrupted || self.is_shutdown_requested() {
                log::info!("Staged hashing interrupted during {}", stage);
                stats.interrupted = true;
                return (ConfirmedGroups::new(), stats);
            }
        }

        let confirmed: ConfirmedGroups = lineages
            .into_iter()
            .map(|lineage| (lineage.key(), lineage.paths))
            .collect();

        stats.confirmed_groups = confirmed.len();
        stats.confirmed_files = confirmed.values().map(Vec::len).sum();
        (confirmed, stats)
    }

    /// One pass over every lineage.
    fn run_stage(
        &self,
        lineages: Vec<Lineage>,
        stage: HashStage,
    ) -> (Vec<Lineage>, StageOutcome, bool) {
        let input_files = lineages.iter().map(|l| l.paths.len()).sum();

        let results: Vec<(Vec<Lineage>, usize, usize, u64, bool)> = lineages
            .into_par_iter()
            .map(|lineage| self.split_lineage(lineage, stage))
            .collect();

        let mut outcome = StageOutcome {
            stage,
            input_files,
            hashed_files: 0,
            failed_files: 0,
            eliminated: 0,
            groups: 0,
            bytes_read: 0,
        };
        let mut interrupted = false;
        let mut next = Vec::new();

        for (children, hashed, failed, bytes, was_interrupted) in results {
            outcome.hashed_files += hashed;
            outcome.failed_files += failed;
            outcome.bytes_read += bytes;
            interrupted |= was_interrupted;
            let kept: usize = children.iter().map(|c| c.paths.len()).sum();
            outcome.eliminated += hashed - kept;
            next.extend(children);
        }

        next.sort();
        outcome.groups = next.len();
        (next, outcome, interrupted)
    }

    /// Hash every member of one lineage and split it by digest.
    ///
    /// Returns the surviving sub-lineages plus counts of hashed files,
    /// failed files and bytes read, and whether shutdown cut the pass short.
    fn split_lineage(
        &self,
        lineage: Lineage,
        stage: HashStage,
    ) -> (Vec<Lineage>, usize, usize, u64, bool) {
        let buckets: DashMap<String, Vec<PathBuf>> = DashMap::new();
        let size = lineage.size;

        let attempts: Vec<Attempt> = lineage
            .paths
            .par_iter()
            .map(|path| {
                let attempt = self.attempt(path, size, stage);
                if let Attempt::Hashed { digest, .. } = &attempt {
                    buckets.entry(digest.clone()).or_default().push(path.clone());
                }
                attempt
            })
            .collect();

        let mut hashed = 0;
        let mut failed = 0;
        let mut bytes = 0;
        let mut interrupted = false;
        for attempt in &attempts {
            match attempt {
                Attempt::Hashed { bytes: b, .. } => {
                    hashed += 1;
                    bytes += b;
                }
                Attempt::Failed => failed += 1,
                Attempt::Interrupted => interrupted = true,
            }
        }

        let children = buckets
            .into_iter()
            .filter(|(_, paths)| paths.len() > 1)
            .map(|(digest, mut paths)| {
                paths.sort();
                let mut digests = lineage.digests.clone();
                digests.push(digest);
                Lineage {
                    size,
                    digests,
                    paths,
                }
            })
            .collect();

        (children, hashed, failed, bytes, interrupted)
    }

    /// Hash one file and report the attempt.
    fn attempt(&self, path: &Path, size: u64, stage: HashStage) -> Attempt {
        if self.is_shutdown_requested() {
            return Attempt::Interrupted;
        }

        let start = Instant::now();
        let result = self.hasher.hash_stage(path, size, stage);
        let elapsed = start.elapsed();

        let (attempt, bytes_read, success) = match result {
            Ok(out) => {
                log::trace!("{} {}: {}", stage, path.display(), out.digest);
                let bytes = out.bytes_read;
                (
                    Attempt::Hashed {
                        digest: out.digest,
                        bytes,
                    },
                    bytes,
                    true,
                )
            }
            Err(HashError::Interrupted(_)) => (Attempt::Interrupted, 0, false),
            Err(e) => {
                self.sink
                    .error(&format!("Failed to hash during {}: {}", stage, e));
                (Attempt::Failed, 0, false)
            }
        };

        self.stats.record_file_processed(&FileRecord {
            path: path.to_path_buf(),
            file_size: size,
            bytes_read,
            elapsed,
            stage,
            success,
        });

        attempt
    }
}
