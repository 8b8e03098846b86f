//! Breadth-first extraction of the final duplicate map.
//!
//! # Overview
//!
//! The extractor walks the annotated tree with an explicit FIFO queue:
//!
//! - a duplicate directory that qualifies as a unit is emitted once under
//!   its `dir:` key and its subtree is not visited,
//! - any other directory has its children enqueued,
//! - a duplicate file is emitted under its `file:` content key,
//! - a unique file is skipped.
//!
//! A duplicate directory qualifies as a unit only when at least one other
//! directory shares its key and the directories with that key hold every
//! copy of each file inside them. Otherwise a copy living elsewhere would be
//! left without its group, so the directory is expanded and its files pair
//! with their loose twins.
//!
//! The tree root and directories above the scan roots only exist to connect
//! the roots, so they are always expanded and never emitted as a unit.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::groups::DuplicateMap;
use crate::scanner::path_utils::is_above_any;
use crate::tree::{DirNode, FsEntry, DIR_KEY_PREFIX};

/// Contract violations found during extraction.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ExtractError {
    /// Extraction must start at a directory.
    #[error("Extraction root is not a directory: {0}")]
    RootNotADirectory(PathBuf),

    /// An entry is flagged duplicate but carries no key.
    #[error("Duplicate entry without a key: {0}")]
    MissingKey(PathBuf),
}

/// Counters from one extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    /// Entries dequeued
    pub visited: usize,
    /// Directory units emitted
    pub directories_emitted: usize,
    /// Duplicate directories expanded because they do not qualify as units
    pub directories_expanded: usize,
    /// File paths kept in the result
    pub files_emitted: usize,
    /// Groups dropped for having fewer than two paths
    pub dropped_file_keys: usize,
    /// Total size of the emitted directory units
    pub directory_bytes: u64,
}

/// Extract the duplicate map from a tree.
///
/// # Arguments
///
/// * `root` - Tree root; must be a directory
/// * `scope_roots` - Scan roots; directories above them are never emitted
///
/// # Errors
///
/// Returns [`ExtractError`] when the tree breaks the extraction contract.
pub fn extract_duplicates(
    root: &FsEntry,
    scope_roots: &[PathBuf],
) -> Result<DuplicateMap, ExtractError> {
    extract_duplicates_with_stats(root, scope_roots).map(|(map, _)| map)
}

/// Like [`extract_duplicates`], also returning counters.
///
/// # Errors
///
/// Returns [`ExtractError`] when the tree breaks the extraction contract.
pub fn extract_duplicates_with_stats(
    root: &FsEntry,
    scope_roots: &[PathBuf],
) -> Result<(DuplicateMap, ExtractStats), ExtractError> {
    match root {
        FsEntry::Dir(dir) => extract_from_dir(dir, scope_roots),
        FsEntry::File(file) => Err(ExtractError::RootNotADirectory(file.path().to_path_buf())),
    }
}

/// Extraction starting from a directory node.
///
/// # Errors
///
/// Returns [`ExtractError::MissingKey`] if a duplicate entry has no key.
pub fn extract_from_dir(
    root: &DirNode,
    scope_roots: &[PathBuf],
) -> Result<(DuplicateMap, ExtractStats), ExtractError> {
    let counts = KeyCounts::collect(root, scope_roots);
    let mut map = DuplicateMap::new();
    let mut stats = ExtractStats::default();
    let mut queue: VecDeque<&FsEntry> = root.children().iter().collect();

    while let Some(entry) = queue.pop_front() {
        stats.visited += 1;
        match entry {
            FsEntry::Dir(dir) => {
                if dir.is_duplicate() && !is_connector(dir.path(), scope_roots) {
                    let key = dir
                        .dir_key()
                        .ok_or_else(|| ExtractError::MissingKey(dir.path().to_path_buf()))?;
                    if counts.is_unit(key, dir) {
                        map.entry(key.to_string())
                            .or_default()
                            .push(dir.path().to_path_buf());
                        stats.directories_emitted += 1;
                        stats.directory_bytes += dir.size();
                        continue;
                    }
                    stats.directories_expanded += 1;
                }
                queue.extend(dir.children());
            }
            FsEntry::File(file) => {
                if file.is_duplicate() {
                    let key = file
                        .content_key()
                        .ok_or_else(|| ExtractError::MissingKey(file.path().to_path_buf()))?;
                    map.entry(key.to_string())
                        .or_default()
                        .push(file.path().to_path_buf());
                }
            }
        }
    }

    map.retain(|key, paths| {
        paths.sort();
        let keep = paths.len() >= 2;
        if !keep {
            stats.dropped_file_keys += 1;
            log::trace!("Dropping group {} with a single path", key);
        }
        keep
    });
    stats.files_emitted = map
        .iter()
        .filter(|(key, _)| !key.starts_with(DIR_KEY_PREFIX))
        .map(|(_, paths)| paths.len())
        .sum();

    Ok((map, stats))
}

/// Directories strictly above a scan root only connect roots to the tree.
fn is_connector(path: &Path, scope_roots: &[PathBuf]) -> bool {
    is_above_any(path, scope_roots)
}

/// How often each key occurs anywhere in the tree.
#[derive(Debug, Default)]
struct KeyCounts<'a> {
    /// Duplicate directories that may be emitted, by `dir:` key
    dirs: HashMap<&'a str, usize>,
    /// Duplicate files, by `file:` key
    files: HashMap<&'a str, usize>,
}

impl<'a> KeyCounts<'a> {
    fn collect(root: &'a DirNode, scope_roots: &[PathBuf]) -> Self {
        let mut counts = Self::default();
        let mut stack: Vec<&'a FsEntry> = root.children().iter().collect();
        while let Some(entry) = stack.pop() {
            match entry {
                FsEntry::Dir(dir) => {
                    if let Some(key) = dir.dir_key() {
                        if !is_connector(dir.path(), scope_roots) {
                            *counts.dirs.entry(key).or_default() += 1;
                        }
                    }
                    stack.extend(dir.children());
                }
                FsEntry::File(file) => {
                    if let Some(key) = file.content_key() {
                        *counts.files.entry(key).or_default() += 1;
                    }
                }
            }
        }
        counts
    }

    /// Directories sharing `key` stand in for their contents only if there
    /// are at least two of them and no copy of their files lives elsewhere.
    ///
    /// Directories with equal keys hold the same multiset of file keys, so
    /// one directory's contents decide for all of them.
    fn is_unit(&self, key: &str, dir: &DirNode) -> bool {
        let copies = self.dirs.get(key).copied().unwrap_or(0);
        if copies < 2 {
            return false;
        }
        let mut inside: HashMap<&str, usize> = HashMap::new();
        count_file_keys(dir, &mut inside);
        inside
            .iter()
            .all(|(file_key, n)| self.files.get(*file_key).copied().unwrap_or(0) == n * copies)
    }
}

fn count_file_keys<'a>(dir: &'a DirNode, out: &mut HashMap<&'a str, usize>) {
    for child in dir.children() {
        match child {
            FsEntry::Dir(sub) => count_file_keys(sub, out),
            FsEntry::File(file) => {
                if let Some(key) = file.content_key() {
                    *out.entry(key).or_default() += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::FileNode;

    fn dup(path: &str, key: &str) -> FsEntry {
        FsEntry::File(FileNode::with_size(PathBuf::from(path), 3, Some(key.to_string())))
    }

    fn unique(path: &str) -> FsEntry {
        FsEntry::File(FileNode::with_size(PathBuf::from(path), 3, None))
    }

    fn dir(path: &str, children: Vec<FsEntry>) -> FsEntry {
        FsEntry::Dir(DirNode::new(PathBuf::from(path), children))
    }

    #[test]
    fn test_duplicate_directories_emitted_as_units() {
        let tree = dir(
            "/t",
            vec![
                dir("/t/d1", vec![dup("/t/d1/x", "file:3-abc")]),
                dir("/t/d2", vec![dup("/t/d2/x", "file:3-abc")]),
            ],
        );
        let roots = vec![PathBuf::from("/t/d1"), PathBuf::from("/t/d2")];
        let (map, stats) = extract_duplicates_with_stats(&tree, &roots).unwrap();

        assert_eq!(map.len(), 1);
        let (key, paths) = map.iter().next().unwrap();
        assert!(key.starts_with("dir:"));
        assert_eq!(paths, &vec![PathBuf::from("/t/d1"), PathBuf::from("/t/d2")]);
        assert_eq!(stats.directories_emitted, 2);
        assert_eq!(stats.files_emitted, 0);
        assert_eq!(stats.directory_bytes, 6);
    }

    #[test]
    fn test_tree_root_never_emitted() {
        let tree = dir(
            "/t",
            vec![dup("/t/a", "file:3-k"), dup("/t/b", "file:3-k")],
        );
        let map = extract_duplicates(&tree, &[PathBuf::from("/t")]).unwrap();

        assert_eq!(
            map.get("file:3-k"),
            Some(&vec![PathBuf::from("/t/a"), PathBuf::from("/t/b")])
        );
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_directories_above_roots_are_expanded() {
        let tree = dir(
            "/",
            vec![dir(
                "/srv",
                vec![
                    dir("/srv/a", vec![dup("/srv/a/f", "file:3-k")]),
                    dir("/srv/b", vec![dup("/srv/b/f", "file:3-k")]),
                ],
            )],
        );
        let roots = vec![PathBuf::from("/srv/a"), PathBuf::from("/srv/b")];
        let map = extract_duplicates(&tree, &roots).unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(map.values().next().unwrap().len(), 2);
        assert!(!map.values().next().unwrap().contains(&PathBuf::from("/srv")));
    }

    #[test]
    fn test_mixed_directory_descends_to_files() {
        let tree = dir(
            "/t",
            vec![
                dir("/t/m", vec![dup("/t/m/a", "file:3-k"), unique("/t/m/u")]),
                dup("/t/b", "file:3-k"),
            ],
        );
        let map = extract_duplicates(&tree, &[PathBuf::from("/t")]).unwrap();

        assert_eq!(
            map.get("file:3-k"),
            Some(&vec![PathBuf::from("/t/b"), PathBuf::from("/t/m/a")])
        );
    }

    #[test]
    fn test_unpaired_directory_descends_to_files() {
        let tree = dir(
            "/t",
            vec![
                dir("/t/d", vec![dup("/t/d/a", "file:3-k")]),
                dir("/t/m", vec![dup("/t/m/a", "file:3-k"), unique("/t/m/u")]),
            ],
        );
        let (map, stats) = extract_duplicates_with_stats(&tree, &[PathBuf::from("/t")]).unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(
            map.get("file:3-k"),
            Some(&vec![PathBuf::from("/t/d/a"), PathBuf::from("/t/m/a")])
        );
        assert_eq!(stats.directories_emitted, 0);
        assert_eq!(stats.directories_expanded, 1);
        assert_eq!(stats.dropped_file_keys, 0);
    }

    #[test]
    fn test_loose_copy_keeps_directories_from_being_units() {
        let tree = dir(
            "/t",
            vec![
                dir("/t/d1", vec![dup("/t/d1/a", "file:3-k")]),
                dir("/t/d2", vec![dup("/t/d2/a", "file:3-k")]),
                dup("/t/loose", "file:3-k"),
            ],
        );
        let (map, stats) = extract_duplicates_with_stats(&tree, &[PathBuf::from("/t")]).unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(
            map.get("file:3-k"),
            Some(&vec![
                PathBuf::from("/t/d1/a"),
                PathBuf::from("/t/d2/a"),
                PathBuf::from("/t/loose"),
            ])
        );
        assert_eq!(stats.directories_expanded, 2);
    }

    #[test]
    fn test_repeated_content_inside_units() {
        let tree = dir(
            "/t",
            vec![
                dir("/t/d1", vec![dup("/t/d1/a", "file:3-k"), dup("/t/d1/b", "file:3-k")]),
                dir("/t/d2", vec![dup("/t/d2/a", "file:3-k"), dup("/t/d2/b", "file:3-k")]),
            ],
        );
        let map = extract_duplicates(&tree, &[PathBuf::from("/t")]).unwrap();

        assert_eq!(map.len(), 1);
        assert!(map.keys().all(|k| k.starts_with(DIR_KEY_PREFIX)));
        assert_eq!(
            map.values().next().unwrap(),
            &vec![PathBuf::from("/t/d1"), PathBuf::from("/t/d2")]
        );
    }

    #[test]
    fn test_empty_directories_not_reported() {
        let tree = dir("/t", vec![dir("/t/e1", Vec::new()), dir("/t/e2", Vec::new())]);
        let map = extract_duplicates(&tree, &[PathBuf::from("/t")]).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_file_root_is_contract_violation() {
        let root = unique("/t/file");
        assert_eq!(
            extract_duplicates(&root, &[]),
            Err(ExtractError::RootNotADirectory(PathBuf::from("/t/file")))
        );
    }

    #[test]
    fn test_nested_duplicate_directory_emits_outermost_only() {
        let tree = dir(
            "/t",
            vec![
                dir("/t/a", vec![dir("/t/a/in", vec![dup("/t/a/in/f", "file:3-k")])]),
                dir("/t/b", vec![dir("/t/b/in", vec![dup("/t/b/in/f", "file:3-k")])]),
            ],
        );
        let map = extract_duplicates(&tree, &[PathBuf::from("/t")]).unwrap();

        let all: Vec<&PathBuf> = map.values().flatten().collect();
        assert_eq!(all, vec![&PathBuf::from("/t/a"), &PathBuf::from("/t/b")]);
    }
}
