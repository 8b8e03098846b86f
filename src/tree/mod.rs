//! Filesystem entity tree.
//!
//! This module provides:
//! - [`FsEntry`], [`FileNode`] and [`DirNode`]: the in-memory model
//! - [`SizeCell`]: the compute-once size memo used by every node
//! - [`TreeBuilder`] and [`DuplicateIndex`]: construction from the staged
//!   hasher's confirmed groups
//!
//! The tree is built once per scan and is read-only afterwards except for
//! the size memos.

pub mod builder;
pub mod entry;
pub mod memo;

use std::io;
use std::path::{Path, PathBuf};

pub use builder::{DuplicateIndex, TreeBuilder};
pub use entry::{
    aggregate_is_duplicate, DirNode, FileNode, FsEntry, DIR_KEY_PREFIX,
    EMPTY_DIRECTORY_IS_DUPLICATE,
};
pub use memo::SizeCell;

/// Errors that can occur while building the tree.
#[derive(thiserror::Error, Debug)]
pub enum TreeError {
    /// The tree root does not exist.
    #[error("Tree root not found: {0}")]
    NotFound(PathBuf),

    /// The tree root is not a directory.
    #[error("Tree root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The tree root could not be inspected.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Shutdown was requested while building.
    #[error("Tree construction interrupted")]
    Interrupted,
}

impl TreeError {
    fn from_io(path: &Path, error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source: error,
            }
        }
    }
}
