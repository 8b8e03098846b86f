//! Builds the annotated filesystem tree under the common ancestor.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use ignore::gitignore::Gitignore;
use rayon::prelude::*;

use super::entry::{DirNode, FileNode, FsEntry};
use super::TreeError;
use crate::duplicates::ConfirmedGroups;
use crate::events::EventSink;
use crate::scanner::path_utils::{
    build_ignore_matcher, is_above_any, is_ignored_name, is_under_any, matches_ignore_pattern,
};

/// Path to confirmed content key.
#[derive(Debug, Clone, Default)]
pub struct DuplicateIndex {
    keys: HashMap<PathBuf, String>,
}

impl DuplicateIndex {
    /// Index every path of every confirmed group.
    #[must_use]
    pub fn from_groups(groups: &ConfirmedGroups) -> Self {
        let keys = groups
            .iter()
            .flat_map(|(key, paths)| paths.iter().map(move |p| (p.clone(), key.clone())))
            .collect();
        Self { keys }
    }

    /// Key of the group containing `path`.
    #[must_use]
    pub fn key_for(&self, path: &Path) -> Option<&str> {
        self.keys.get(path).map(String::as_str)
    }

    /// Number of indexed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Builds a [`DirNode`] tree annotated with duplicate status.
///
/// Only directories inside a scope root, or on the path from the tree root
/// down to one, are read. Anything else becomes an opaque leaf: an
/// out-of-scope directory has no children and is therefore never a
/// duplicate.
///
/// # Example
///
/// ```no_run
/// use dupetree::duplicates::ConfirmedGroups;
/// use dupetree::events::LogSink;
/// use dupetree::scanner::default_ignored_names;
/// use dupetree::tree::{DuplicateIndex, TreeBuilder};
/// use std::path::{Path, PathBuf};
/// use std::sync::Arc;
///
/// let index = DuplicateIndex::from_groups(&ConfirmedGroups::new());
/// let builder = TreeBuilder::new(
///     index,
///     vec![PathBuf::from("/data/a"), PathBuf::from("/data/b")],
///     default_ignored_names(),
///     Arc::new(LogSink),
/// );
/// let root = builder.build(Path::new("/data"))?;
/// println!("{} entries", root.descendant_count());
/// # Ok::<(), dupetree::tree::TreeError>(())
/// ```
pub struct TreeBuilder {
    index: DuplicateIndex,
    scope_roots: Vec<PathBuf>,
    ignored_names: Vec<String>,
    ignore_matchers: Vec<(PathBuf, Gitignore)>,
    sink: Arc<dyn EventSink>,
    shutdown_flag: Option<Arc<AtomicBool>>,
    read_failures: AtomicUsize,
}

impl std::fmt::Debug for TreeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeBuilder")
            .field("indexed_paths", &self.index.len())
            .field("scope_roots", &self.scope_roots)
            .field("ignored_names", &self.ignored_names)
            .finish_non_exhaustive()
    }
}

impl TreeBuilder {
    /// Create a builder.
    ///
    /// # Arguments
    ///
    /// * `index` - Confirmed duplicate files
    /// * `scope_roots` - The scan roots; an empty list puts everything in scope
    /// * `ignored_names` - Metadata artifact names left out of the tree
    /// * `sink` - Destination for directory read failures
    #[must_use]
    pub fn new(
        index: DuplicateIndex,
        scope_roots: Vec<PathBuf>,
        ignored_names: Vec<String>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            index,
            scope_roots,
            ignored_names,
            ignore_matchers: Vec::new(),
            sink,
            shutdown_flag: None,
            read_failures: AtomicUsize::new(0),
        }
    }

    /// Leave out entries matched by gitignore-style `patterns`, anchored at
    /// each scope root the same way the collector anchors them.
    #[must_use]
    pub fn with_ignore_patterns(mut self, patterns: &[String]) -> Self {
        self.ignore_matchers = self
            .scope_roots
            .iter()
            .filter_map(|root| build_ignore_matcher(root, patterns).map(|m| (root.clone(), m)))
            .collect();
        self
    }

    /// Set the shutdown flag checked before every directory read.
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

    /// Directories that could not be read during the last build.
    #[must_use]
    pub fn read_failures(&self) -> usize {
        self.read_failures.load(Ordering::Relaxed)
    }

    /// Build the tree rooted at `ancestor`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError`] if `ancestor` is missing or not a directory, or
    /// if shutdown was requested while building.
    pub fn build(&self, ancestor: &Path) -> Result<DirNode, TreeError> {
        let metadata = fs::metadata(ancestor).map_err(|e| TreeError::from_io(ancestor, e))?;
        if !metadata.is_dir() {
            return Err(TreeError::NotADirectory(ancestor.to_path_buf()));
        }

        self.read_failures.store(0, Ordering::Relaxed);
        let root = self.build_dir(ancestor.to_path_buf());

        if self.is_shutdown_requested() {
            return Err(TreeError::Interrupted);
        }

        log::debug!(
            "Built tree under {}: {} entries, {} unreadable directories",
            ancestor.display(),
            root.descendant_count(),
            self.read_failures()
        );
        Ok(root)
    }

    /// An entry is dropped when every scope root holding it ignores it.
    fn is_pattern_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let mut holders = self
            .ignore_matchers
            .iter()
            .filter(|(root, _)| path != root && path.starts_with(root))
            .peekable();
        holders.peek().is_some()
            && holders.all(|(root, matcher)| matches_ignore_pattern(matcher, root, path, is_dir))
    }

    fn in_scope(&self, path: &Path) -> bool {
        is_under_any(path, &self.scope_roots) || is_above_any(path, &self.scope_roots)
    }

    fn build_dir(&self, path: PathBuf) -> DirNode {
        if self.is_shutdown_requested() {
            return DirNode::new(path, Vec::new());
        }

        let read = match fs::read_dir(&path) {
            Ok(read) => read,
            Err(e) => {
                self.read_failures.fetch_add(1, Ordering::Relaxed);
                self.sink.error(&format!(
                    "Failed to read directory {}: {}",
                    path.display(),
                    e
                ));
                return DirNode::new(path, Vec::new());
            }
        };

        let mut entries = Vec::new();
        for entry in read {
            match entry {
                Ok(entry) => {
                    if is_ignored_name(&entry.file_name(), &self.ignored_names) {
                        continue;
                    }
                    match entry.file_type() {
                        Ok(file_type) => {
                            let child = entry.path();
                            if self.is_pattern_ignored(&child, file_type.is_dir()) {
                                log::trace!("Leaving ignored entry out of tree: {}", child.display());
                                continue;
                            }
                            entries.push((child, file_type.is_dir()));
                        }
                        Err(e) => self.sink.error(&format!(
                            "Failed to read entry type of {}: {}",
                            entry.path().display(),
                            e
                        )),
                    }
                }
                Err(e) => self.sink.error(&format!(
                    "Failed to read an entry of {}: {}",
                    path.display(),
                    e
                )),
            }
        }

        let children: Vec<FsEntry> = entries
            .into_par_iter()
            .map(|(child, is_dir)| self.build_entry(child, is_dir))
            .collect();

        DirNode::new(path, children)
    }

    fn build_entry(&self, path: PathBuf, is_dir: bool) -> FsEntry {
        if is_dir {
            if self.in_scope(&path) {
                FsEntry::Dir(self.build_dir(path))
            } else {
                log::trace!("Not descending out-of-scope directory {}", path.display());
                FsEntry::Dir(DirNode::new(path, Vec::new()))
            }
        } else {
            let key = self.index.key_for(&path).map(str::to_owned);
            FsEntry::File(FileNode::new(path, key))
        }
    }
}
