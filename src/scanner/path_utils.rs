//! Path helpers shared by the collector, the tree builder and the finder.
//!
//! All functions operate component-wise, so `/data/ab` is never treated as
//! nested under `/data/a`.
//!
//! # Example
//!
//! ```
//! use dupetree::scanner::path_utils::{common_ancestor, is_under_any};
//! use std::path::{Path, PathBuf};
//!
//! let roots = vec![PathBuf::from("/data/a/x"), PathBuf::from("/data/a/y")];
//! assert_eq!(common_ancestor(&roots), Some(PathBuf::from("/data/a")));
//! assert!(is_under_any(Path::new("/data/a/x/file"), &roots));
//! assert!(!is_under_any(Path::new("/data/a/xy"), &roots));
//! ```

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// Deepest directory that contains every path in `paths`.
///
/// Returns `None` for an empty slice or when the paths share no leading
/// component (for example relative and absolute paths mixed, or two
/// different Windows drives). A single path is its own ancestor.
#[must_use]
pub fn common_ancestor(paths: &[PathBuf]) -> Option<PathBuf> {
    let (first, rest) = paths.split_first()?;
    let mut shared: Vec<Component<'_>> = first.components().collect();

    for path in rest {
        let matching = shared
            .iter()
            .zip(path.components())
            .take_while(|(a, b)| *a == b)
            .count();
        shared.truncate(matching);
        if shared.is_empty() {
            return None;
        }
    }

    if shared.is_empty() {
        return None;
    }
    Some(shared.iter().collect())
}

/// Whether `path` equals or lies below at least one of `roots`.
///
/// An empty `roots` slice means "no filter" and accepts everything.
#[must_use]
pub fn is_under_any(path: &Path, roots: &[PathBuf]) -> bool {
    roots.is_empty() || roots.iter().any(|root| path.starts_with(root))
}

/// Whether `path` is a strict ancestor of at least one of `roots`.
#[must_use]
pub fn is_above_any(path: &Path, roots: &[PathBuf]) -> bool {
    roots
        .iter()
        .any(|root| root != path && root.starts_with(path))
}

/// Whether a file name is one of the configured OS metadata artifacts.
#[must_use]
pub fn is_ignored_name(name: &OsStr, ignored: &[String]) -> bool {
    ignored.iter().any(|n| OsStr::new(n) == name)
}

/// Whether the final component of `path` is an ignored name.
#[must_use]
pub fn has_ignored_name(path: &Path, ignored: &[String]) -> bool {
    path.file_name()
        .is_some_and(|name| is_ignored_name(name, ignored))
}

/// Gitignore-style matcher for `patterns`, anchored at `root`.
///
/// Invalid patterns are logged and skipped. Returns `None` when no usable
/// pattern remains.
#[must_use]
pub fn build_ignore_matcher(root: &Path, patterns: &[String]) -> Option<Gitignore> {
    if patterns.is_empty() {
        return None;
    }

    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        if let Err(e) = builder.add_line(None, pattern) {
            log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
        }
    }

    match builder.build() {
        Ok(gitignore) if !gitignore.is_empty() => Some(gitignore),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Failed to build ignore patterns: {}", e);
            None
        }
    }
}

/// Whether `path`, relative to `root`, is matched by `matcher`.
#[must_use]
pub fn matches_ignore_pattern(matcher: &Gitignore, root: &Path, path: &Path, is_dir: bool) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let normalized = if cfg!(windows) {
        relative.to_string_lossy().replace('\\', "/")
    } else {
        relative.to_string_lossy().into_owned()
    };
    matcher.matched(normalized, is_dir).is_ignore()
}
