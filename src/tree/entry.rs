//! In-memory filesystem entries.
//!
//! # Overview
//!
//! An [`FsEntry`] is either a [`FileNode`] or a [`DirNode`]. Every traversal
//! matches on it exhaustively.
//!
//! - A file is a duplicate iff the staged hasher confirmed it; it then
//!   carries the confirmed content key.
//! - A directory is a duplicate iff it has at least one child and every
//!   child is a duplicate. The flag is derived once, when the node is built
//!   from its finished children, and never changes afterwards.
//! - Sizes are lazy: a file stats itself on first request and a directory
//!   sums its children. Both go through a [`SizeCell`].
//!
//! A duplicate directory carries a Merkle-style identity: the SHA-256 of
//! its children's keys, sorted. Two directories get the same key exactly
//! when their children have the same multiset of content keys, which makes
//! the key independent of entry names and of where the directory lives.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::memo::SizeCell;

/// Whether a directory without children counts as a duplicate.
///
/// Empty directories carry no content, so they are never reported.
pub const EMPTY_DIRECTORY_IS_DUPLICATE: bool = false;

/// Prefix of directory-level keys in the duplicate map.
pub const DIR_KEY_PREFIX: &str = "dir:";

/// A file leaf.
#[derive(Debug)]
pub struct FileNode {
    path: PathBuf,
    size: SizeCell,
    content_key: Option<String>,
}

impl FileNode {
    /// Create a leaf. `content_key` is set only for confirmed duplicates.
    #[must_use]
    pub fn new(path: PathBuf, content_key: Option<String>) -> Self {
        Self {
            path,
            size: SizeCell::new(),
            content_key,
        }
    }

    /// Create a leaf whose size is already known.
    #[must_use]
    pub fn with_size(path: PathBuf, size: u64, content_key: Option<String>) -> Self {
        let node = Self::new(path, content_key);
        node.size.get_or_init(|| size);
        node
    }

    /// Absolute path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Confirmed content key, if this file is a duplicate.
    #[must_use]
    pub fn content_key(&self) -> Option<&str> {
        self.content_key.as_deref()
    }

    /// Whether the staged hasher confirmed this file.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.content_key.is_some()
    }

    /// Size in bytes, read from the filesystem on first use.
    ///
    /// A stat failure is logged and reported as zero without caching, so a
    /// later call tries again.
    pub fn size(&self) -> u64 {
        self.size
            .get_or_try_init(|| fs::symlink_metadata(&self.path).map(|m| m.len()))
            .unwrap_or_else(|e| {
                log::warn!("Cannot read size of {}: {}", self.path.display(), e);
                0
            })
    }

    /// Drop the cached size.
    pub fn invalidate_size(&self) {
        self.size.invalidate();
    }
}

/// A directory with exclusively owned children.
#[derive(Debug)]
pub struct DirNode {
    path: PathBuf,
    children: Vec<FsEntry>,
    size: SizeCell,
    is_duplicate: bool,
    dir_key: Option<String>,
}

impl DirNode {
    /// Create a directory from its finished children.
    ///
    /// Children are ordered by path. The duplicate flag and, for duplicates,
    /// the directory key are derived here.
    #[must_use]
    pub fn new(path: PathBuf, mut children: Vec<FsEntry>) -> Self {
        children.sort_by(|a, b| a.path().cmp(b.path()));
        let is_duplicate = aggregate_is_duplicate(&children);
        let dir_key = is_duplicate.then(|| merkle_key(&children));
        Self {
            path,
            children,
            size: SizeCell::new(),
            is_duplicate,
            dir_key,
        }
    }

    /// Absolute path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Children ordered by path.
    #[must_use]
    pub fn children(&self) -> &[FsEntry] {
        &self.children
    }

    /// Whether every child is a duplicate (and there is at least one).
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.is_duplicate
    }

    /// Directory-level key, present only for duplicate directories.
    #[must_use]
    pub fn dir_key(&self) -> Option<&str> {
        self.dir_key.as_deref()
    }

    /// Sum of the children's sizes, computed on first use.
    pub fn size(&self) -> u64 {
        self.size
            .get_or_init(|| self.children.iter().map(FsEntry::size).sum())
    }

    /// Drop the cached size of this directory and everything below it.
    pub fn invalidate_size(&self) {
        self.size.invalidate();
        for child in &self.children {
            child.invalidate_size();
        }
    }

    /// Number of entries in this subtree, excluding the directory itself.
    #[must_use]
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                FsEntry::File(_) => 1,
                FsEntry::Dir(dir) => 1 + dir.descendant_count(),
            })
            .sum()
    }
}

/// A node of the filesystem tree.
#[derive(Debug)]
pub enum FsEntry {
    /// A file leaf (symlinks are leaves too)
    File(FileNode),
    /// A directory
    Dir(DirNode),
}

impl FsEntry {
    /// Absolute path.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::File(file) => file.path(),
            Self::Dir(dir) => dir.path(),
        }
    }

    /// Lazily computed size.
    pub fn size(&self) -> u64 {
        match self {
            Self::File(file) => file.size(),
            Self::Dir(dir) => dir.size(),
        }
    }

    /// Duplicate flag.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        match self {
            Self::File(file) => file.is_duplicate(),
            Self::Dir(dir) => dir.is_duplicate(),
        }
    }

    /// Content key for files, directory key for directories.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::File(file) => file.content_key(),
            Self::Dir(dir) => dir.dir_key(),
        }
    }

    /// Drop cached sizes in this subtree.
    pub fn invalidate_size(&self) {
        match self {
            Self::File(file) => file.invalidate_size(),
            Self::Dir(dir) => dir.invalidate_size(),
        }
    }
}

/// Bottom-up duplicate rule for a directory with `children`.
#[must_use]
pub fn aggregate_is_duplicate(children: &[FsEntry]) -> bool {
    if children.is_empty() {
        return EMPTY_DIRECTORY_IS_DUPLICATE;
    }
    children.iter().all(FsEntry::is_duplicate)
}

/// SHA-256 over the sorted keys of `children`.
fn merkle_key(children: &[FsEntry]) -> String {
    let mut keys: Vec<&str> = children.iter().filter_map(FsEntry::key).collect();
    keys.sort_unstable();

    let mut hasher = Sha256::new();
    for key in keys {
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
    }
    format!("{}{:x}", DIR_KEY_PREFIX, hasher.finalize())
}
