//! Candidate file discovery using jwalk for parallel traversal.
//!
//! # Overview
//!
//! [`Walker`] walks one root and yields every file that is eligible for
//! duplicate detection:
//!
//! - a regular file (symlinks are skipped unless following is enabled),
//! - readable by this process, and writable unless `require_writable` is off,
//! - larger than zero bytes,
//! - not an OS metadata artifact such as `.DS_Store`,
//! - not matched by a gitignore-style ignore pattern,
//! - nested under one of the root filter paths, if any are configured.
//!
//! Ignored names and patterns are pruned while reading each directory, so an
//! ignored directory is never descended. Per-entry failures are yielded as
//! [`ScanError`] values and never stop the walk.
//!
//! # Example
//!
//! ```no_run
//! use dupetree::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Pictures"), WalkerConfig::default());
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("skipped: {}", e),
//!     }
//! }
//! ```

use std::fs::{File, Metadata, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jwalk::WalkDir;

use super::path_utils::{
    build_ignore_matcher, is_ignored_name, is_under_any, matches_ignore_pattern,
};
use super::{FileEntry, ScanError, WalkerConfig};

/// Directory walker for candidate discovery.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Root directory to walk
    /// * `config` - Eligibility rules
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag; the walk ends early once it is raised.
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

    /// Walk the root, yielding eligible files in a deterministic order.
    ///
    /// Errors are yielded as [`ScanError`] values rather than ending the
    /// iteration.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, ScanError>> + '_ {
        let gitignore = build_ignore_matcher(&self.root, &self.config.ignore_patterns);
        let ignored_names = self.config.ignored_names.clone();
        let root = self.root.clone();

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(false)
            .process_read_dir(move |_depth, _parent, _state, children| {
                children.retain(|child| match child {
                    Ok(entry) => {
                        if is_ignored_name(entry.file_name(), &ignored_names) {
                            log::trace!("Pruning metadata artifact: {}", entry.path().display());
                            return false;
                        }
                        match &gitignore {
                            Some(gi) => !matches_ignore_pattern(
                                gi,
                                &root,
                                &entry.path(),
                                entry.file_type().is_dir(),
                            ),
                            None => true,
                        }
                    }
                    Err(_) => true,
                });
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            match entry_result {
                Ok(entry) => {
                    let path = entry.path();
                    if path == self.root {
                        return None;
                    }

                    let file_type = entry.file_type();
                    if file_type.is_dir() {
                        return None;
                    }
                    if file_type.is_symlink() && !self.config.follow_symlinks {
                        log::trace!("Skipping symlink: {}", path.display());
                        return None;
                    }

                    let metadata = if self.config.follow_symlinks {
                        std::fs::metadata(&path)
                    } else {
                        std::fs::symlink_metadata(&path)
                    };
                    match metadata {
                        Ok(m) => self.check_eligibility(path, &m),
                        Err(e) => Some(Err(ScanError::from_io(&path, e))),
                    }
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    Some(Err(ScanError::Io {
                        path,
                        source: std::io::Error::other(e.to_string()),
                    }))
                }
            }
        })
    }

    /// Apply the file-level eligibility rules.
    fn check_eligibility(
        &self,
        path: PathBuf,
        metadata: &Metadata,
    ) -> Option<Result<FileEntry, ScanError>> {
        if !metadata.is_file() {
            return None;
        }

        let size = metadata.len();
        if size == 0 {
            log::trace!("Skipping empty file: {}", path.display());
            return None;
        }

        if !is_under_any(&path, &self.config.root_filter) {
            log::trace!("Outside root filter: {}", path.display());
            return None;
        }

        if self.config.require_writable && !is_writable(&path, metadata) {
            log::debug!("Skipping read-only file: {}", path.display());
            return None;
        }

        if let Err(e) = File::open(&path) {
            return Some(Err(ScanError::from_io(&path, e)));
        }

        Some(Ok(FileEntry::new(path, size)))
    }
}

/// Whether this process may write `path`.
///
/// Mode bits say nothing about ownership, so a file that looks writable is
/// also opened for writing. The handle is dropped unused; the file is never
/// truncated or modified.
fn is_writable(path: &Path, metadata: &Metadata) -> bool {
    if metadata.permissions().readonly() {
        return false;
    }
    OpenOptions::new().write(true).open(path).is_ok()
}
